//! Revision-control access for diagtrack
//!
//! Analyses need the project's true revision order and, for manual review,
//! the source of a file at a given revision. Both go through the
//! [`RevisionControl`] trait so tests can run against an in-memory history.
//!
//! ## Example
//!
//! ```rust,ignore
//! use diagtrack_vcs::{GitRepository, RevisionControl, SourceCache};
//!
//! let repo = GitRepository::open("path/to/project")?;
//! let history = repo.revisions()?;
//! let mut sources = SourceCache::new(&repo);
//! let text = sources.load("src/Main.java", &history.revisions()[0])?;
//! ```

pub mod git;
pub mod memory;
pub mod repository;
pub mod source_cache;

pub use git::GitRepository;
pub use memory::InMemoryRepository;
pub use repository::{RevisionControl, VcsError};
pub use source_cache::SourceCache;
