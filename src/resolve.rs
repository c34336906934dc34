//! Classifies a received response and decodes it.
//!
//! A 2xx response is decoded into the caller's destination and every error
//! slot, each independently. Any other status is an error; its body is decoded
//! into the error slots only to enrich that error.

use crate::{
    codec::JsonCodec,
    error::{join, DecodeError, ErrorResponse, ResponseInfo},
    request::ErrorSlot,
    BoxError,
};
use serde::de::DeserializeOwned;

pub(crate) fn resolve<T>(
    response: &ResponseInfo,
    mut slots: Vec<Box<dyn ErrorSlot>>,
    destination: Option<&mut T>,
    codec: &JsonCodec,
) -> Result<(), ErrorResponse>
where
    T: DeserializeOwned,
{
    let raw = response.raw_body.as_ref();

    if !response.status.is_success() {
        let failures = decode_slots(&mut slots, raw, codec);
        if !slots.is_empty() && failures.len() == slots.len() {
            // The status line says more than a body we can't parse.
            return Err(ErrorResponse::new(
                response.status_line(),
                Some(response.clone()),
                None,
            ));
        }

        let reported: Vec<BoxError> = slots
            .into_iter()
            .filter(|slot| !slot.message().is_empty())
            .map(ErrorSlot::into_error)
            .collect();
        return Err(ErrorResponse::new(
            response.status_line(),
            Some(response.clone()),
            join(reported),
        ));
    }

    let Some(destination) = destination else {
        return Ok(());
    };

    let mut failures = Vec::new();
    if !is_blank(raw) {
        match codec.decode::<T>(raw) {
            Ok(value) => *destination = value,
            Err(e) => failures.push(e),
        }
    }
    failures.extend(decode_slots(&mut slots, raw, codec));

    if failures.len() == slots.len() + 1 {
        return Err(ErrorResponse::new(
            "failed to unmarshal response",
            Some(response.clone()),
            Some(Box::new(DecodeError::new(failures))),
        ));
    }

    if let Some(index) = slots.iter().position(|slot| !slot.message().is_empty()) {
        let slot = slots.swap_remove(index);
        return Err(ErrorResponse::new(
            "error in response",
            Some(response.clone()),
            Some(slot.into_error()),
        ));
    }

    Ok(())
}

/// Decodes `raw` into every slot, returning the failures.
fn decode_slots(
    slots: &mut [Box<dyn ErrorSlot>],
    raw: &[u8],
    codec: &JsonCodec,
) -> Vec<serde_json::Error> {
    if is_blank(raw) {
        return Vec::new();
    }
    slots
        .iter_mut()
        .filter_map(|slot| slot.decode(codec, raw).err())
        .collect()
}

fn is_blank(raw: &[u8]) -> bool {
    raw.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::error_slot;
    use bytes::Bytes;
    use http::{HeaderMap, StatusCode};
    use serde::Deserialize;
    use std::fmt;
    use url::Url;

    #[derive(Debug, Default, Deserialize)]
    struct ApiFault {
        #[serde(default)]
        error: String,
    }

    impl fmt::Display for ApiFault {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.error)
        }
    }

    impl std::error::Error for ApiFault {}

    #[derive(Debug, Default, Deserialize)]
    struct Detailed {
        #[serde(default)]
        detail: String,
    }

    impl fmt::Display for Detailed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.detail)
        }
    }

    impl std::error::Error for Detailed {}

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Quota {
        remaining: u32,
    }

    fn info(status: u16, body: &'static str) -> ResponseInfo {
        ResponseInfo {
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            url: Url::parse("https://api.example.com/quota").unwrap(),
            raw_body: Bytes::from_static(body.as_bytes()),
        }
    }

    fn codec() -> JsonCodec {
        JsonCodec::default()
    }

    #[test]
    fn test_success_decodes_destination() {
        let mut quota = Quota::default();
        let result = resolve(
            &info(200, r#"{"remaining": 5}"#),
            vec![error_slot::<ApiFault>()],
            Some(&mut quota),
            &codec(),
        );
        assert!(result.is_ok());
        assert_eq!(quota, Quota { remaining: 5 });
    }

    #[test]
    fn test_success_without_destination_skips_decoding() {
        let result = resolve::<Quota>(&info(200, "not json"), Vec::new(), None, &codec());
        assert!(result.is_ok());
    }

    #[test]
    fn test_logical_error_in_success_body() {
        let mut quota = Quota::default();
        let err = resolve(
            &info(200, r#"{"error": "quota exceeded"}"#),
            vec![error_slot::<ApiFault>()],
            Some(&mut quota),
            &codec(),
        )
        .unwrap_err();

        assert_eq!(err.message(), "error in response");
        assert_eq!(err.find::<ApiFault>().unwrap().error, "quota exceeded");
        assert_eq!(err.to_string(), "error in response: quota exceeded");
    }

    #[test]
    fn test_all_decodes_failing_is_an_error() {
        let mut quota = Quota::default();
        let err = resolve(
            &info(200, "<html>oops</html>"),
            vec![error_slot::<ApiFault>()],
            Some(&mut quota),
            &codec(),
        )
        .unwrap_err();

        assert_eq!(err.message(), "failed to unmarshal response");
        assert_eq!(err.find::<DecodeError>().unwrap().failures().len(), 2);
    }

    #[test]
    fn test_destination_failure_alone_is_tolerated() {
        let mut quota = Quota::default();
        let result = resolve(
            &info(200, r#"{"unrelated": true}"#),
            vec![error_slot::<ApiFault>()],
            Some(&mut quota),
            &codec(),
        );
        assert!(result.is_ok());
        assert_eq!(quota, Quota::default());
    }

    #[test]
    fn test_blank_body_decodes_nothing() {
        let mut quota = Quota { remaining: 9 };
        let result = resolve(&info(204, ""), Vec::new(), Some(&mut quota), &codec());
        assert!(result.is_ok());
        assert_eq!(quota.remaining, 9);
    }

    #[test]
    fn test_error_status_without_slots() {
        let err =
            resolve::<Quota>(&info(404, "missing"), Vec::new(), None, &codec()).unwrap_err();
        assert_eq!(err.to_string(), "404 Not Found");
        assert!(err.parent().is_none());
        assert_eq!(err.response().unwrap().text(), "missing");
    }

    #[test]
    fn test_error_status_with_undecodable_body() {
        let err = resolve::<Quota>(
            &info(502, "<html>bad gateway</html>"),
            vec![error_slot::<ApiFault>()],
            None,
            &codec(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "502 Bad Gateway");
        assert!(err.parent().is_none());
    }

    #[test]
    fn test_error_status_joins_reported_slots() {
        let err = resolve::<Quota>(
            &info(422, r#"{"error": "invalid name", "detail": "too long"}"#),
            vec![error_slot::<ApiFault>(), error_slot::<Detailed>()],
            None,
            &codec(),
        )
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "422 Unprocessable Entity: invalid name\ntoo long"
        );
        assert!(err.find::<ApiFault>().is_some());
        assert!(err.find::<Detailed>().is_some());
    }

    #[test]
    fn test_error_status_skips_empty_messages() {
        let err = resolve::<Quota>(
            &info(400, r#"{"detail": "bad cursor"}"#),
            vec![error_slot::<ApiFault>(), error_slot::<Detailed>()],
            None,
            &codec(),
        )
        .unwrap_err();

        assert!(err.find::<ApiFault>().is_none());
        assert_eq!(err.find::<Detailed>().unwrap().detail, "bad cursor");
    }
}
