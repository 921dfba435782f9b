//! CoAP mapping - methods, response codes, options and link format

use coap_lite::{CoapOption, MessageClass, Packet, RequestType, ResponseType};

use crate::{
    Method, QueryParams, ResourceProperties, STATUS_BAD_REQUEST, STATUS_METHOD_NOT_ALLOWED,
    STATUS_NOT_FOUND, STATUS_OK,
};

/// Observe option values (RFC 7641)
pub const OBSERVE_REGISTER: u32 = 0;
pub const OBSERVE_DEREGISTER: u32 = 1;

/// Map a CoAP request code to a resource method; FETCH/PATCH are not served
pub fn method_from_code(code: &MessageClass) -> Option<Method> {
    match code {
        MessageClass::Request(RequestType::Get) => Some(Method::Get),
        MessageClass::Request(RequestType::Put) => Some(Method::Put),
        MessageClass::Request(RequestType::Post) => Some(Method::Post),
        MessageClass::Request(RequestType::Delete) => Some(Method::Delete),
        _ => None,
    }
}

/// Map a handler status to a CoAP response code
pub fn response_code(status: u16, method: Method) -> ResponseType {
    match (status, method) {
        (STATUS_OK, Method::Get) => ResponseType::Content,
        (STATUS_OK, Method::Put) | (STATUS_OK, Method::Post) => ResponseType::Changed,
        (STATUS_OK, Method::Delete) => ResponseType::Deleted,
        (STATUS_BAD_REQUEST, _) => ResponseType::BadRequest,
        (STATUS_NOT_FOUND, _) => ResponseType::NotFound,
        (STATUS_METHOD_NOT_ALLOWED, _) => ResponseType::MethodNotAllowed,
        _ => ResponseType::InternalServerError,
    }
}

/// Absolute path built from the Uri-Path options
pub fn path(packet: &Packet) -> String {
    let mut path = String::new();
    if let Some(segments) = packet.get_option(CoapOption::UriPath) {
        for segment in segments {
            path.push('/');
            path.push_str(&String::from_utf8_lossy(segment));
        }
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

/// Add Uri-Path options for an absolute path
pub fn set_path(packet: &mut Packet, path: &str) {
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        packet.add_option(CoapOption::UriPath, segment.as_bytes().to_vec());
    }
}

/// Uri-Query options as `key=value` pairs; a bare key maps to an empty value
pub fn query_params(packet: &Packet) -> QueryParams {
    let mut params = QueryParams::new();
    if let Some(queries) = packet.get_option(CoapOption::UriQuery) {
        for query in queries {
            let query = String::from_utf8_lossy(query);
            match query.split_once('=') {
                Some((k, v)) => params.insert(k.to_string(), v.to_string()),
                None => params.insert(query.to_string(), String::new()),
            };
        }
    }
    params
}

/// Value of the Observe option, if present and well formed
pub fn observe_value(packet: &Packet) -> Option<u32> {
    let raw = packet.get_option(CoapOption::Observe)?.front()?;
    if raw.len() > 3 {
        return None;
    }
    Some(raw.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
}

/// Set the Observe option; sequence numbers are 24 bits wide
pub fn set_observe(packet: &mut Packet, sequence: u32) {
    let bytes = (sequence & 0x00FF_FFFF).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    packet.clear_option(CoapOption::Observe);
    packet.add_option(CoapOption::Observe, bytes[skip..].to_vec());
}

/// One CoRE link-format entry (RFC 6690)
#[derive(Debug, Clone)]
pub struct Link<'a> {
    pub uri: &'a str,
    pub resource_type: &'a str,
    pub interface: &'a str,
    pub properties: ResourceProperties,
}

impl Link<'_> {
    fn write_to(&self, out: &mut String) {
        out.push_str(&format!(
            "<{}>;rt=\"{}\";if=\"{}\"",
            self.uri, self.resource_type, self.interface
        ));
        if self.properties.contains(ResourceProperties::OBSERVABLE) {
            out.push_str(";obs");
        }
        if self.properties.contains(ResourceProperties::SECURE) {
            out.push_str(";sec");
        }
    }
}

/// Render links as a link-format document
pub fn link_format<'a>(links: impl IntoIterator<Item = Link<'a>>) -> String {
    let mut out = String::new();
    for (i, link) in links.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        link.write_to(&mut out);
    }
    out
}
