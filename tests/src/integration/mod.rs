//! Integration flows across `api-gateway`, `shared-bus` and `shared-types`.

#[cfg(test)]
pub mod fixtures;

#[cfg(test)]
mod fault_isolation;
#[cfg(test)]
mod push_flow;
#[cfg(test)]
mod rest_flow;
