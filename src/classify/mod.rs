mod classifier;
mod post;

pub use classifier::{classify, ClassifiedGrid};
pub use post::post_process;
