//! Microsoft Graph access: authenticated requests, paging and the group endpoints.

pub mod client;
pub mod models;
pub mod pager;
pub mod request;

pub use client::GraphClient;
pub use models::{DirectoryObject, UserProfile};
pub use pager::{ListState, Page, PageSource, PagedLister};
pub use request::{AuthenticatedClient, GraphRequest};
