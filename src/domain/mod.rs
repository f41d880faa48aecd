mod amount;
mod budget;
mod symbol;
mod validation;

pub use amount::*;
pub use budget::*;
pub use symbol::*;
pub use validation::*;
