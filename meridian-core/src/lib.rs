//! Meridian Core
//!
//! Plans a VPC topology from a handful of parameters and provisions it.
//!
//! The pieces run in phases:
//!
//! 1. A [`provider::ZoneSource`] resolves the available zones.
//! 2. [`topology::plan`] derives subnets, NAT gateways and routes. It is pure.
//! 3. [`plan::Plan::for_network`] declares the cloud resources for that layout.
//! 4. An [`interpreter::Interpreter`] creates them through a [`provider::Provider`].

pub mod cidr;
pub mod config;
pub mod declare;
pub mod interpreter;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod topology;
