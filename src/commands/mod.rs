pub mod annotate;
pub mod collate;
pub mod filter;

pub use annotate::annotate;
pub use collate::collate;
pub use filter::filter;
