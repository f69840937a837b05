use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{request::Parts, HeaderMap, StatusCode};
use std::{
    fmt::{self, Formatter},
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

const FORWARD_HEADERS: [&str; 4] = [
    "x-client-ip",
    "x-forwarded-for",
    "x-real-ip",
    "cf-connecting-ip",
];

/// Address of the webhook sender, honouring the usual reverse proxy headers.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr {
    pub addr: SocketAddr,
}

impl ClientAddr {
    pub fn new(addr: SocketAddr) -> Self {
        ClientAddr { addr }
    }

    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    pub fn from_http_parts(headers: &HeaderMap, connect_info: Option<SocketAddr>) -> Self {
        let mut addr = connect_info
            .unwrap_or_else(|| SocketAddr::from((IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)));

        for header in FORWARD_HEADERS {
            let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) else {
                continue;
            };
            // X-Forwarded-For may carry a chain, the first hop is the client
            let first_ip = value.split(',').next().unwrap_or(value).trim();
            if let Ok(ip) = first_ip.parse::<IpAddr>() {
                addr.set_ip(ip);
                break;
            }
        }
        ClientAddr { addr }
    }
}

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let connect_info = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientAddr::from_http_parts(&parts.headers, connect_info))
    }
}

impl fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}
