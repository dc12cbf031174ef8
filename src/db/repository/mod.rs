pub mod coordination;
pub mod event;
pub mod owner;
pub mod todo;

pub use coordination::{
    CommandRepository, DashboardTaskRepository, ImageRepository, InstanceRepository,
};
pub use event::EventRepository;
pub use owner::OwnerRepository;
pub use todo::TodoRepository;
