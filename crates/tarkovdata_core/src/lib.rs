pub mod ammo;
pub mod ammo_sync;
pub mod apply;
pub mod caliber;
pub mod config;
pub mod confirm;
pub mod diff;
pub mod export;
pub mod fetch;
pub mod hideout;
pub mod hideout_sync;
pub mod inspect;
pub mod levels;
pub mod quests;
pub mod record;
pub mod report;
pub mod runtime;
pub mod status;
pub mod store;
pub mod table;
pub mod values;
