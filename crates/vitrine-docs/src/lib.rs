//! Vitrine docs
//!
//! Composes documentation pages from the same declarations stories are built
//! from. A page is a list of [`Block`]s resolved against the store into
//! [`Section`]s; [`DocsPage::to_node`] turns it into a tree the preview mounts
//! like any story.
//!
//! The generated autodocs page uses [`default_template`]:
//! `Title, Subtitle, Description, Primary, Controls, Stories`.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod blocks;
pub mod markdown;
pub mod page;

pub use blocks::{default_template, Block};
pub use page::{ArgRow, DocsError, DocsPage, DocsRenderer, Section, StoryPreview};

/// Docs crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
