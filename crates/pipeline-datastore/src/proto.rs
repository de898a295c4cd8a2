//! Generated gRPC stubs, compiled by `build.rs` from
//! `proto/ob/pipeline/v1/datastore.proto` — the same `tonic_build` pattern
//! `entity-gateway/build.rs` uses.

pub mod ob {
    pub mod pipeline {
        pub mod v1 {
            tonic::include_proto!("ob.pipeline.v1");
        }
    }
}
