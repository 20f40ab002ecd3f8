mod ancestors;
pub mod cache;
pub mod captures;
pub mod engine;
pub mod local_fs;
pub mod naming;
pub mod normalize;
pub mod paths;
pub mod resolver;
pub mod retention;
#[cfg(test)]
mod test_drive;
