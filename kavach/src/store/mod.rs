pub mod blacklist;
pub mod persist;
pub mod phishing;
pub mod sessions;
