pub mod github;

pub use github::GitHubHost;
