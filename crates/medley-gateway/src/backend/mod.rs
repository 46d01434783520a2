//! Backend module: resolution, balancing and the upstream transport.

mod balancer;
mod resolver;
mod upstream;

pub use balancer::RoundRobin;
pub use resolver::StaticServiceResolver;
pub use upstream::{
    HOP_BY_HOP, HttpUpstream, UpstreamClient, UpstreamError, UpstreamRequest, is_hop_by_hop,
    strip_hop_by_hop,
};
