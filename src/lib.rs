// SPDX-License-Identifier: Apache-2.0

pub mod bounded_channel;
pub mod component;
pub mod components;
pub mod config;
pub mod confmap;
pub mod exporters;
pub mod extensions;
pub mod init;
pub mod listener;
pub mod processors;
pub mod receivers;
pub mod service;
pub mod telemetry;
pub mod topology;
