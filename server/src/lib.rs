pub mod dispatcher;
pub mod init;
pub mod world;
