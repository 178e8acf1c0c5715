pub mod memory;

pub use memory::InMemoryPostsRepository;
