use super::DecodeError;
use crate::transaction::{Transaction, TransactionEvent};

/// Decodes UTF-8 JSON objects of the shape
/// `{"transaction_id": str, "user_id": int, "amount": number, "timestamp": str}`
pub struct Decoder;

impl super::Decoder for Decoder {
    fn get_name(&self) -> String {
        String::from("json")
    }
    fn decode(&self, message: &[u8]) -> Result<Transaction, DecodeError> {
        let ev: TransactionEvent = serde_json::from_slice(message)?;
        Ok(Transaction::from(ev))
    }
}

#[cfg(test)]
mod tests {
    use super::Decoder;
    use crate::decoder::{DecodeError, Decoder as _};

    #[test]
    fn decodes_and_classifies() {
        let tx = Decoder
            .decode(br#"{"transaction_id":"a1","user_id":42,"amount":3500.25,"timestamp":"2024-01-01T00:00:00Z"}"#)
            .unwrap();
        assert_eq!(tx.transaction_id, "a1");
        assert_eq!(tx.user_id, 42);
        assert_eq!(tx.amount, 3500.25);
        assert_eq!(tx.timestamp, "2024-01-01T00:00:00Z");
        assert!(tx.is_fraud);
    }

    #[test]
    fn integer_amount_is_accepted() {
        let tx = Decoder
            .decode(br#"{"transaction_id":"a2","user_id":1,"amount":3000,"timestamp":"t"}"#)
            .unwrap();
        assert_eq!(tx.amount, 3000.0);
        assert!(!tx.is_fraud);
    }

    #[test]
    fn is_fraud_on_the_wire_is_ignored() {
        let tx = Decoder
            .decode(br#"{"transaction_id":"a3","user_id":1,"amount":10.0,"timestamp":"t","is_fraud":true}"#)
            .unwrap();
        assert!(!tx.is_fraud);
    }

    #[test]
    fn rejects_missing_field() {
        let err = Decoder
            .decode(br#"{"transaction_id":"a4","user_id":1,"timestamp":"t"}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn rejects_wrong_types() {
        for payload in [
            &br#"{"transaction_id":"a5","user_id":"one","amount":1.0,"timestamp":"t"}"#[..],
            &br#"{"transaction_id":"a6","user_id":1.5,"amount":1.0,"timestamp":"t"}"#[..],
            &br#"{"transaction_id":7,"user_id":1,"amount":1.0,"timestamp":"t"}"#[..],
            &br#"{"transaction_id":"a8","user_id":1,"amount":"1.0","timestamp":"t"}"#[..],
        ] {
            assert!(Decoder.decode(payload).is_err());
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(Decoder.decode(b"not json").is_err());
        assert!(Decoder.decode(b"").is_err());
        assert!(Decoder.decode(&[0xff, 0xfe]).is_err());
    }
}
