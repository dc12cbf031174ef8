pub mod models;
pub mod repository;

pub use models::{
    Command, CommandStatus, CreateDashboardTask, CreateEvent, CreatePastedImage, DashboardTask,
    DeleteAllOutcome, Event, EventFields, EventOccurrence, Instance, InstanceStatus, Owner,
    OwnerProfile, PastedImage, Recurrence, RecurrencePattern, TaskPriority, TaskStatus, Todo,
    UpdateDashboardTask, UpdateEvent, UpsertAction, UpsertOutcome,
};
pub use repository::{
    CommandRepository, DashboardTaskRepository, EventRepository, ImageRepository,
    InstanceRepository, OwnerRepository, TodoRepository,
};
