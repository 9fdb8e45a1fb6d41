pub mod order;
pub mod product;
pub mod promo;

pub use order::*;
pub use product::*;
pub use promo::*;
