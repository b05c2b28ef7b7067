//! Raw SCPI-over-TCP session.
//!
//! Rigol scopes listen for newline-terminated SCPI on port 5555. Replies are either a
//! newline-terminated line or an IEEE 488.2 definite-length block (`#<n><len><data>`),
//! which is how the display dump arrives.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, trace};

use super::session::{Session, TransportError, TransportSettings};

/// Port of the raw SCPI socket server on LXI instruments.
pub const DEFAULT_SCPI_PORT: u16 = 5555;

/// Host and port parsed from an instrument resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAddr {
    pub host: String,
    pub port: u16,
}

impl ResourceAddr {
    /// Accepts `TCPIP[n]::<host>[::<device>]::INSTR`, `TCPIP[n]::<host>::<port>::SOCKET`
    /// and bare `<host>[:<port>]`.
    pub fn parse(resource: &str) -> Result<Self, TransportError> {
        let trimmed = resource.trim();
        let invalid = || TransportError::InvalidResource(resource.to_string());
        if trimmed.is_empty() {
            return Err(invalid());
        }

        if !trimmed.contains("::") {
            let (host, port) = match trimmed.rsplit_once(':') {
                Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
                None => (trimmed, DEFAULT_SCPI_PORT),
            };
            if host.is_empty() {
                return Err(invalid());
            }
            return Ok(Self {
                host: host.to_string(),
                port,
            });
        }

        let parts: Vec<&str> = trimmed.split("::").collect();
        if !parts[0].to_ascii_uppercase().starts_with("TCPIP") {
            return Err(invalid());
        }
        let (host, port) = match parts.as_slice() {
            [_, host] => (*host, DEFAULT_SCPI_PORT),
            [_, host, class] if class.eq_ignore_ascii_case("INSTR") => (*host, DEFAULT_SCPI_PORT),
            [_, host, _device, class] if class.eq_ignore_ascii_case("INSTR") => {
                (*host, DEFAULT_SCPI_PORT)
            }
            [_, host, port, class] if class.eq_ignore_ascii_case("SOCKET") => {
                (*host, port.parse().map_err(|_| invalid())?)
            }
            _ => return Err(invalid()),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

pub struct TcpSession {
    resource: String,
    stream: Option<TcpStream>,
    settings: TransportSettings,
    /// Bytes received past the end of the last response.
    pending: Vec<u8>,
    /// A block response may be followed by a newline that has not arrived yet.
    skip_newline: bool,
}

impl TcpSession {
    pub fn open(resource: &str, settings: TransportSettings) -> Result<Self, TransportError> {
        let addr = ResourceAddr::parse(resource)?;
        let connect_err = |source| TransportError::Connect {
            resource: resource.to_string(),
            source,
        };

        let candidates = (addr.host.as_str(), addr.port)
            .to_socket_addrs()
            .map_err(connect_err)?;

        let mut last_err = io::Error::new(ErrorKind::NotFound, "host resolved to no addresses");
        let mut stream = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, settings.timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = e,
            }
        }
        let stream = stream.ok_or_else(|| connect_err(last_err))?;

        stream
            .set_read_timeout(Some(settings.timeout))
            .and_then(|_| stream.set_write_timeout(Some(settings.timeout)))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(connect_err)?;

        debug!(
            resource,
            host = %addr.host,
            port = addr.port,
            timeout_ms = settings.timeout.as_millis() as u64,
            chunk_size = settings.chunk_size,
            "Connected to instrument"
        );

        Ok(Self {
            resource: resource.to_string(),
            stream: Some(stream),
            settings,
            pending: Vec::new(),
            skip_newline: false,
        })
    }

    fn map_io(&self, e: io::Error) -> TransportError {
        match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => TransportError::Timeout {
                resource: self.resource.clone(),
                timeout_ms: self.settings.timeout.as_millis() as u64,
            },
            _ => TransportError::Io {
                resource: self.resource.clone(),
                source: e,
            },
        }
    }

    /// Reads one chunk of at most `chunk_size` bytes into `pending`.
    fn fill(&mut self) -> Result<(), TransportError> {
        let mut buf = vec![0u8; self.settings.chunk_size.max(1)];
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransportError::NotOpen(self.resource.clone()))?;
        let n = loop {
            match stream.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.map_io(e)),
            }
        };
        if n == 0 {
            return Err(TransportError::Closed(self.resource.clone()));
        }
        trace!(bytes = n, "Read chunk");
        self.pending.extend_from_slice(&buf[..n]);
        if self.skip_newline {
            // Only the first byte after a block can be its terminator.
            if self.pending.first() == Some(&b'\n') {
                self.pending.remove(0);
            }
            self.skip_newline = false;
        }
        Ok(())
    }

    fn fill_to(&mut self, len: usize) -> Result<(), TransportError> {
        while self.pending.len() < len {
            self.fill()?;
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Vec<u8> {
        let rest = self.pending.split_off(len);
        std::mem::replace(&mut self.pending, rest)
    }

    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                let mut line = self.take(pos + 1);
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(line);
            }
            self.fill()?;
        }
    }

    fn read_block(&mut self) -> Result<Vec<u8>, TransportError> {
        self.fill_to(2)?;
        let digits = match self.pending[1] {
            d @ b'1'..=b'9' => usize::from(d - b'0'),
            // `#0` is an indefinite-length block terminated by a newline.
            b'0' => return self.read_line(),
            other => {
                return Err(TransportError::Protocol {
                    resource: self.resource.clone(),
                    detail: format!("invalid block header digit {:?}", other as char),
                })
            }
        };

        self.fill_to(2 + digits)?;
        let len_text = std::str::from_utf8(&self.pending[2..2 + digits]).ok();
        let data_len: usize = len_text.and_then(|t| t.parse().ok()).ok_or_else(|| {
            TransportError::Protocol {
                resource: self.resource.clone(),
                detail: format!(
                    "invalid block length {:?}",
                    String::from_utf8_lossy(&self.pending[2..2 + digits])
                ),
            }
        })?;

        let total = 2 + digits + data_len;
        debug!(bytes = total, "Receiving binary block");
        self.fill_to(total)?;
        let block = self.take(total);

        match self.pending.first() {
            Some(b'\n') => {
                self.pending.remove(0);
            }
            Some(_) => {}
            None => self.skip_newline = true,
        }
        Ok(block)
    }
}

impl Session for TcpSession {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        trace!(command, "Sending command");
        let mut line = command.trim_end().as_bytes().to_vec();
        line.push(b'\n');
        let result = match self.stream.as_mut() {
            Some(stream) => stream.write_all(&line).and_then(|_| stream.flush()),
            None => return Err(TransportError::NotOpen(self.resource.clone())),
        };
        result.map_err(|e| self.map_io(e))
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        self.write(command)?;
        let line = self.read_line()?;
        let reply = String::from_utf8_lossy(&line).trim().to_string();
        trace!(command, reply = %reply, "Query answered");
        Ok(reply)
    }

    fn read_raw(&mut self) -> Result<Vec<u8>, TransportError> {
        self.fill_to(1)?;
        if self.pending[0] == b'#' {
            self.read_block()
        } else {
            self.read_line()
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        self.pending.clear();
        match stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(self.map_io(e)),
        }
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    fn settings(chunk_size: usize, timeout_ms: u64) -> TransportSettings {
        TransportSettings {
            timeout: Duration::from_millis(timeout_ms),
            chunk_size,
        }
    }

    /// Binds a local listener and runs `script` against the first connection.
    fn spawn_instrument<F>(script: F) -> (String, thread::JoinHandle<()>)
    where
        F: FnOnce(BufReader<TcpStream>, TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let reader = BufReader::new(stream.try_clone().unwrap());
            script(reader, stream);
        });
        (addr, handle)
    }

    fn read_command(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        line
    }

    #[test]
    fn test_parse_visa_instr_resource() {
        let addr = ResourceAddr::parse("TCPIP::192.168.4.120::INSTR").unwrap();
        assert_eq!(addr.host, "192.168.4.120");
        assert_eq!(addr.port, 5555);

        let addr = ResourceAddr::parse("TCPIP0::scope.lan::inst0::INSTR").unwrap();
        assert_eq!(addr.host, "scope.lan");
        assert_eq!(addr.port, 5555);
    }

    #[test]
    fn test_parse_socket_and_bare_resources() {
        let addr = ResourceAddr::parse("TCPIP0::10.0.0.2::5025::SOCKET").unwrap();
        assert_eq!(addr.port, 5025);

        let addr = ResourceAddr::parse("10.0.0.2:5025").unwrap();
        assert_eq!(addr.host, "10.0.0.2");
        assert_eq!(addr.port, 5025);

        let addr = ResourceAddr::parse("scope").unwrap();
        assert_eq!(addr.port, DEFAULT_SCPI_PORT);
    }

    #[test]
    fn test_parse_rejects_unsupported_resources() {
        for bad in ["", "USB0::0x1AB1::0x04B0::DS2A1::INSTR", "TCPIP::::INSTR", "host:port"] {
            assert!(
                matches!(
                    ResourceAddr::parse(bad),
                    Err(TransportError::InvalidResource(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_query_returns_trimmed_line() {
        let (addr, handle) = spawn_instrument(|mut reader, mut stream| {
            assert_eq!(read_command(&mut reader), "*IDN?\n");
            stream.write_all(b"RIGOL TECHNOLOGIES,MSO2302A,DS2A1,00.03.02\r\n").unwrap();
        });

        let mut session = TcpSession::open(&addr, settings(1420, 2000)).unwrap();
        let reply = session.query("*IDN?").unwrap();
        assert_eq!(reply, "RIGOL TECHNOLOGIES,MSO2302A,DS2A1,00.03.02");
        session.close().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_read_raw_assembles_block_from_small_chunks() {
        let (addr, handle) = spawn_instrument(|mut reader, mut stream| {
            assert_eq!(read_command(&mut reader), ":DISPlay:DATA?\n");
            for piece in [&b"#90000"[..], b"00010", b"0123", b"456789\n"] {
                stream.write_all(piece).unwrap();
                stream.flush().unwrap();
                thread::sleep(Duration::from_millis(10));
            }
            assert_eq!(read_command(&mut reader), "*OPC?\n");
            stream.write_all(b"1\n").unwrap();
        });

        let mut session = TcpSession::open(&addr, settings(3, 2000)).unwrap();
        session.write(":DISPlay:DATA?").unwrap();
        let raw = session.read_raw().unwrap();
        assert_eq!(raw, b"#90000000100123456789".to_vec());
        // The block's trailing newline must not leak into the next reply.
        assert_eq!(session.query("*OPC?").unwrap(), "1");
        handle.join().unwrap();
    }

    #[test]
    fn test_block_without_newline_does_not_eat_later_replies() {
        let (addr, handle) = spawn_instrument(|mut reader, mut stream| {
            read_command(&mut reader);
            stream.write_all(b"#14abcd").unwrap();
            assert_eq!(read_command(&mut reader), "*OPC?\n");
            stream.write_all(b"1\n").unwrap();
            assert_eq!(read_command(&mut reader), ":SYSTem:ERRor?\n");
            stream.write_all(b"\n").unwrap();
        });

        let mut session = TcpSession::open(&addr, settings(1420, 500)).unwrap();
        session.write(":DISPlay:DATA?").unwrap();
        assert_eq!(session.read_raw().unwrap(), b"#14abcd".to_vec());
        assert_eq!(session.query("*OPC?").unwrap(), "1");
        assert_eq!(session.query(":SYSTem:ERRor?").unwrap(), "");
        handle.join().unwrap();
    }

    #[test]
    fn test_read_raw_rejects_bad_block_header() {
        let (addr, handle) = spawn_instrument(|mut reader, mut stream| {
            read_command(&mut reader);
            stream.write_all(b"#X123\n").unwrap();
        });

        let mut session = TcpSession::open(&addr, settings(1420, 2000)).unwrap();
        session.write(":DISPlay:DATA?").unwrap();
        let err = session.read_raw().unwrap_err();
        assert!(matches!(err, TransportError::Protocol { .. }));
        handle.join().unwrap();
    }

    #[test]
    fn test_query_times_out_when_instrument_is_silent() {
        let (addr, handle) = spawn_instrument(|mut reader, _stream| {
            read_command(&mut reader);
            // Hold the connection open until the client gives up.
            let mut rest = String::new();
            let _ = reader.read_line(&mut rest);
        });

        let mut session = TcpSession::open(&addr, settings(1420, 100)).unwrap();
        let err = session.query("*IDN?").unwrap_err();
        assert!(matches!(err, TransportError::Timeout { timeout_ms: 100, .. }));
        session.close().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_closed_connection_is_reported() {
        let (addr, handle) = spawn_instrument(|mut reader, stream| {
            read_command(&mut reader);
            drop(reader);
            drop(stream);
        });

        let mut session = TcpSession::open(&addr, settings(1420, 2000)).unwrap();
        let err = session.query("*IDN?").unwrap_err();
        assert!(matches!(err, TransportError::Closed(_)));
        handle.join().unwrap();
    }

    #[test]
    fn test_calls_after_close_fail() {
        let (addr, handle) = spawn_instrument(|mut reader, _stream| {
            let mut rest = String::new();
            let _ = reader.read_line(&mut rest);
        });

        let mut session = TcpSession::open(&addr, settings(1420, 2000)).unwrap();
        session.close().unwrap();
        session.close().unwrap();
        assert!(matches!(
            session.write("*IDN?"),
            Err(TransportError::NotOpen(_))
        ));
        handle.join().unwrap();
    }
}
