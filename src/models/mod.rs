mod post;
mod user;

pub use post::*;
pub use user::*;
