pub mod fanout;
pub mod hybrid;
pub mod model;
pub mod normalizer;
pub mod query;
pub mod score;
