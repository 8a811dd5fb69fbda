//! Generated protobuf types and gRPC stubs of `pipemesh.v1.PipelineService`.

tonic::include_proto!("pipemesh.v1");
