// Core modules implementing wire framing and error modeling.
pub mod error;
pub mod frame;
