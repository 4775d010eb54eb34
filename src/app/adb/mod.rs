pub mod apk;
pub mod apps;
pub mod locator;
pub mod parse;
pub mod paths;
pub mod runner;
pub mod session;
