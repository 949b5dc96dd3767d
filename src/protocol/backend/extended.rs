//! Extended query protocol backend messages.

use crate::error::Result;
use crate::protocol::codec::{ensure_consumed, read_nullable_bytes, read_u16, read_u32};
use crate::protocol::types::Oid;

/// ParameterDescription message - describes parameters for a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescription {
    param_oids: Vec<Oid>,
}

impl ParameterDescription {
    /// Create from parameter type OIDs.
    pub fn new(param_oids: Vec<Oid>) -> Self {
        Self { param_oids }
    }

    /// Parse a ParameterDescription message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (num_params, mut data) = read_u16(payload)?;
        let mut param_oids = Vec::with_capacity(num_params as usize);

        for _ in 0..num_params {
            let (oid, rest) = read_u32(data)?;
            param_oids.push(oid);
            data = rest;
        }
        ensure_consumed("ParameterDescription", data)?;

        Ok(Self { param_oids })
    }

    /// Get the number of parameters.
    pub fn len(&self) -> usize {
        self.param_oids.len()
    }

    /// Check if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.param_oids.is_empty()
    }

    /// Get parameter type OIDs.
    pub fn oids(&self) -> &[Oid] {
        &self.param_oids
    }
}

/// FunctionCallResponse message - result of a FunctionCall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCallResponse {
    /// Result value, `None` for NULL
    pub value: Option<Vec<u8>>,
}

impl FunctionCallResponse {
    /// Parse a FunctionCallResponse message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (value, rest) = read_nullable_bytes(payload)?;
        ensure_consumed("FunctionCallResponse", rest)?;
        Ok(Self {
            value: value.map(<[u8]>::to_vec),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_description() {
        let mut payload = 2_u16.to_be_bytes().to_vec();
        payload.extend_from_slice(&23_u32.to_be_bytes());
        payload.extend_from_slice(&25_u32.to_be_bytes());
        let desc = ParameterDescription::parse(&payload).unwrap();
        assert_eq!(desc.oids(), &[23, 25]);

        assert!(ParameterDescription::parse(&payload[..5]).is_err());
    }

    #[test]
    fn function_call_response_null() {
        let resp = FunctionCallResponse::parse(&(-1_i32).to_be_bytes()).unwrap();
        assert_eq!(resp.value, None);
    }
}
