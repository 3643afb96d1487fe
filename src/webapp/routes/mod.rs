//! `/api/*` endpoint handlers grouped by area

pub mod admin;
pub mod auction;
pub mod invitation;
pub mod luckywheel;
pub mod premium;
pub mod rankings;
pub mod system;
pub mod user;
