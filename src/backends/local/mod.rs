// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod echo;
pub mod factory;
pub mod pcm_stitch;

pub use echo::EchoEngine;
pub use factory::LocalEngineFactory;
pub use pcm_stitch::PcmStitchEngine;
