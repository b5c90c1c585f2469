//! Traits shared by every optimizer.

mod optimizable;

pub use optimizable::Optimizable;
pub(crate) use optimizable::run;
