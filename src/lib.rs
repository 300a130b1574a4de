//! Data type configuration orchestrator.
//!
//! Brings an arbitrary set of independently failing sync data types up and
//! down: each band of types is downloaded through a [`DataTypeConfigurer`],
//! associated by its controller and activated, while errors are isolated per
//! type in a [`DataTypeStatusTable`] and every configure call ends in exactly
//! one [`ConfigureResult`].
//!
//! [`DataTypeConfigurer`]: application::DataTypeConfigurer
//! [`DataTypeStatusTable`]: domain::DataTypeStatusTable
//! [`ConfigureResult`]: domain::ConfigureResult

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
