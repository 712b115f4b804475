mod asset_amount;
mod helpers;

pub mod op;
mod secret;

pub use asset_amount::{AmountConversionError, AssetAmount, AssetSpec, MAX_ASSET_DECIMALS};
pub use helpers::parse_boolean_flag;
pub use secret::Secret;
