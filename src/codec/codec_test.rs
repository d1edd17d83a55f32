use crate::proto::ReplyHeader;
use crate::proto::ReplyPacket;
use crate::proto::Request;
use crate::proto::RequestPacket;
use crate::proto::Response;
use crate::proto::WatcherEvent;
use crate::proto::NOTIFICATION_XID;
use crate::BincodeCodec;
use crate::Codec;
use crate::ZkError;

#[test]
fn test_decode_garbage_is_marshalling_error() {
    let codec = BincodeCodec;
    let err = codec.decode(&[0xff, 0xff, 0xff]).unwrap_err();
    assert_eq!(err.status(), ZkError::MarshallingError);

    let err = codec.decode_connect(&[]).unwrap_err();
    assert_eq!(err.status(), ZkError::MarshallingError);
}

#[test]
fn test_notification_survives_the_boundary() {
    let reply = ReplyPacket {
        header: ReplyHeader {
            xid: NOTIFICATION_XID,
            zxid: -1,
            err: 0,
        },
        response: Response::Notification(WatcherEvent {
            event_type: 3,
            state: 3,
            path: "/app/config".into(),
        }),
    };
    let bytes = bincode::serialize(&reply).unwrap();

    let decoded = BincodeCodec.decode(&bytes).unwrap();
    assert_eq!(decoded, reply);
}

#[test]
fn test_encoded_request_is_server_decodable() {
    let packet = RequestPacket {
        xid: 7,
        request: Request::SetData {
            path: "/a".into(),
            data: b"v".to_vec(),
            version: -1,
        },
    };
    let bytes = BincodeCodec.encode(&packet).unwrap();
    let decoded: RequestPacket = bincode::deserialize(&bytes).unwrap();
    assert_eq!(decoded.xid, 7);
    assert_eq!(decoded.request.op_name(), "set");
}
