pub mod hanging;
pub mod reconcile;
pub mod summary;
pub mod util;

pub use hanging::*;
pub use reconcile::*;
pub use summary::*;
pub use util::*;
