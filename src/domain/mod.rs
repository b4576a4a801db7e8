// Domain layer: data model and ports (interfaces). No filesystem or codec logic here.

pub mod header;
pub mod model;
pub mod ports;
pub mod solar_map;
