use tokio_util::bytes::{BufMut, BytesMut};

use super::types::*;

pub trait Encode {
    fn encode(&self, out: &mut BytesMut);

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = BytesMut::new();
        self.encode(&mut out);
        out.to_vec()
    }
}

fn comma_enc(out: &mut BytesMut) {
    out.put(&b","[..])
}

fn quote_enc(out: &mut BytesMut) {
    out.put(&b"\""[..])
}

/// `name="value"`, the value is written as is: an embedded quote is not escaped.
impl Encode for Attribute {
    fn encode(&self, out: &mut BytesMut) {
        out.put(self.name.as_bytes());
        out.put(&b"="[..]);
        quote_enc(out);
        out.put(&self.value[..]);
        quote_enc(out);
    }
}

impl Encode for AttributeList {
    fn encode(&self, out: &mut BytesMut) {
        for (i, attr) in self.0.iter().enumerate() {
            if i > 0 {
                comma_enc(out);
            }
            attr.encode(out);
        }
    }
}
