use http::header::HeaderValue;
use http::Uri;
use percent_encoding::percent_decode_str;

pub(crate) fn basic_auth<U, P>(username: U, password: Option<P>) -> HeaderValue
where
    U: std::fmt::Display,
    P: std::fmt::Display,
{
    use base64::prelude::BASE64_STANDARD;
    use base64::write::EncoderWriter;
    use std::io::Write;

    let mut buf = b"Basic ".to_vec();
    {
        let mut encoder = EncoderWriter::new(&mut buf, &BASE64_STANDARD);
        let _ = write!(encoder, "{username}:");
        if let Some(password) = password {
            let _ = write!(encoder, "{password}");
        }
    }
    let mut header = match HeaderValue::from_maybe_shared(bytes::Bytes::from(buf)) {
        Ok(header) => header,
        // base64 output and the fixed prefix are always visible ASCII
        Err(_) => unreachable!("base64 is always valid HeaderValue"),
    };
    header.set_sensitive(true);
    header
}

/// The percent-decoded `user[:password]` of an absolute URI.
pub(crate) fn userinfo(uri: &Uri) -> Option<(String, Option<String>)> {
    let authority = uri.authority()?.as_str();
    let (info, _) = authority.rsplit_once('@')?;
    let decode = |s: &str| percent_decode_str(s).decode_utf8_lossy().into_owned();
    match info.split_once(':') {
        Some((user, pass)) => Some((decode(user), Some(decode(pass)))),
        None => Some((decode(info), None)),
    }
}
