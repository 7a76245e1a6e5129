mod utils;

pub use utils::{test_db, test_utils};

mod api;
mod programs;
mod session_cards;
mod users;
