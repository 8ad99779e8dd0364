//! # Links Parser
//!
//! The boundary between free text and the acquisition engine:
//! platform parsers implement the [`LinkParser`] capability, and a
//! [`LinkRouter`] selects one per URL by first match in registration
//! order.

pub mod error;
pub mod parser;
pub mod router;

pub use error::ParseError;
pub use parser::LinkParser;
pub use router::{LinkRouter, RoutedLink};
