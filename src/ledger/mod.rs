mod action;
mod backend;
mod http;
mod reader;

pub use action::*;
pub use backend::*;
pub use http::HttpLedger;
pub use reader::*;
