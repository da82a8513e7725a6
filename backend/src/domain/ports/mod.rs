//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod farm_command;
mod farm_query;
mod farm_store;

#[cfg(test)]
pub use farm_command::MockFarmCommand;
pub use farm_command::{
    CreateFarmRequest, FarmCommand, ReassignFarmRequest, UpdateFarmGeometryRequest,
};
#[cfg(test)]
pub use farm_query::{MockFarmMaintenance, MockFarmQuery};
pub use farm_query::{FarmMaintenance, FarmQuery, FindOverlappingRequest};
#[cfg(test)]
pub use farm_store::MockFarmStore;
pub use farm_store::{FarmChange, FarmStore, FarmStoreError, FarmWrite};
