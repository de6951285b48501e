pub mod genre;
pub mod migrate;
pub mod model;
pub mod repo;
pub mod sqlite;

pub use genre::Genre;
pub use model::*;
pub use repo::*;
pub use sqlite::SqliteRepository;
