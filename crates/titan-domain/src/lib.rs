//! Illustrative domain cells built on `titan-runtime`: an `Account`
//! profile, a `Season` that declares hardcore/void/fallback flags, a
//! `Character` that lives inside one season and migrates on hardcore
//! death, an `Inventory` of item ids, a `Trade` that moves items between
//! two inventories under two-phase commit, and a stateless-worker
//! `BaseTypeRegistry` catalog. `infra` is the process-wide wiring every
//! cell here reaches into in place of constructor-based dependency
//! injection, which `titan_runtime::Cell::new`'s fixed `Identity`-only
//! signature does not allow.

pub mod account;
pub mod character;
pub mod infra;
pub mod inventory;
pub mod registry;
pub mod season;
pub mod trade;

pub use account::{Account, AccountCall, AccountState};
pub use character::{Character, CharacterCall, CharacterState};
pub use inventory::{Inventory, InventoryCall, InventoryState};
pub use registry::{BaseTypeCall, BaseTypeDef, BaseTypeRegistry};
pub use season::{Season, SeasonCall, SeasonState};
pub use trade::{Trade, TradeCall, TradeState, TradeStatus};
