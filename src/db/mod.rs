pub mod analytics;
pub mod exercises;
pub mod locations;
pub mod metrics;
pub mod notifications;
pub mod programs;
pub mod schedules;
pub mod session_cards;
pub mod sessions;
pub mod trainees;
pub mod trainers;
pub mod users;

pub use analytics::*;
pub use exercises::*;
pub use locations::*;
pub use metrics::*;
pub use notifications::*;
pub use programs::*;
pub use schedules::*;
pub use session_cards::*;
pub use sessions::*;
pub use trainees::*;
pub use trainers::*;
pub use users::*;
