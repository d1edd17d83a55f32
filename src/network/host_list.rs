use crate::utils::path::Chroot;
use crate::ClientResult;
use crate::ZkError;

/// Parsed connection string: `host1:port1,host2:port2[/chroot]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HostList {
    pub(crate) servers: Vec<String>,
    pub(crate) chroot: Chroot,
}

impl HostList {
    pub(crate) fn parse(raw: &str) -> ClientResult<Self> {
        let (hosts, chroot) = match raw.find('/') {
            Some(idx) => (&raw[..idx], Chroot::parse(&raw[idx..])?),
            None => (raw, Chroot::default()),
        };

        let mut servers = Vec::new();
        for entry in hosts.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            servers.push(parse_server(entry)?);
        }

        if servers.is_empty() {
            return Err(ZkError::BadArguments);
        }
        Ok(Self { servers, chroot })
    }
}

fn parse_server(entry: &str) -> ClientResult<String> {
    let (host, port) = entry.rsplit_once(':').ok_or(ZkError::BadArguments)?;
    let host = host.trim();
    if host.is_empty() {
        return Err(ZkError::BadArguments);
    }
    match port.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(format!("{host}:{port}")),
        _ => Err(ZkError::BadArguments),
    }
}
