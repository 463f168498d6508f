//! Generated protobuf types for `tranqu_server.proto.v1`.

tonic::include_proto!("tranqu_server.proto.v1");
