// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod spec;
mod static_builder;
mod template;

pub mod presets;

pub use spec::NodeSpec;
pub use static_builder::StaticGraphBuilder;
pub use template::BranchTemplate;
