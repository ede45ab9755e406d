pub mod import;
pub mod init;
pub mod inspect;
pub mod merge;

pub use import::{import, ImportArgs};
pub use init::{init, InitArgs};
pub use inspect::{inspect, InspectArgs};
pub use merge::{merge, MergeArgs};
