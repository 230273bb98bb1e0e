// SPDX-License-Identifier: Apache-2.0

pub mod batch;
pub mod builder;
pub mod consumer;
pub mod fanout;
pub mod payload;
