//! Link implementations over a serial port and a TCP socket

pub mod serial {
    //! Serial port link

    use std::io::{Read, Write};
    use std::time::Duration;

    use nandump_core::{ByteLink, LinkError, LinkResult};
    use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

    use crate::error::{open_failed, port_failed};

    /// Default baud rate of the dump firmware
    pub const DEFAULT_BAUD: u32 = 921_600;

    /// Serial port link
    pub struct SerialLink {
        port: Box<dyn SerialPort>,
        device: String,
        timeout: Duration,
    }

    impl SerialLink {
        /// Open a serial port, 8N1 without flow control
        ///
        /// Uses [`DEFAULT_BAUD`] when `baud` is `None`.
        pub fn open(device: &str, baud: Option<u32>) -> LinkResult<Self> {
            let baud_rate = baud.unwrap_or(DEFAULT_BAUD);
            let timeout = Duration::from_millis(100);

            let port = serialport::new(device, baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(timeout)
                .open()
                .map_err(|e| open_failed(device, e))?;

            log::info!("Opened serial port {} at {} baud", device, baud_rate);

            Ok(Self {
                port,
                device: device.to_string(),
                timeout,
            })
        }

        fn set_timeout(&mut self, timeout: Duration) -> LinkResult<()> {
            // a zero timeout would turn the port non-blocking
            let timeout = timeout.max(Duration::from_millis(1));
            if timeout != self.timeout {
                self.port.set_timeout(timeout).map_err(port_failed)?;
                self.timeout = timeout;
            }
            Ok(())
        }
    }

    impl ByteLink for SerialLink {
        fn write(&mut self, data: &[u8]) -> LinkResult<()> {
            self.port.write_all(data)?;
            Ok(())
        }

        fn read_up_to(&mut self, buf: &mut [u8], timeout: Duration) -> LinkResult<usize> {
            self.set_timeout(timeout)?;

            match self.port.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(0),
                Err(e) => Err(LinkError::from(e)),
            }
        }

        fn flush(&mut self) -> LinkResult<()> {
            self.port.flush()?;
            Ok(())
        }

        fn description(&self) -> String {
            self.device.clone()
        }
    }
}

pub mod tcp {
    //! TCP socket link, for serial-to-network bridges

    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    use nandump_core::{ByteLink, LinkError, LinkResult};

    /// TCP socket link
    pub struct TcpLink {
        stream: TcpStream,
        addr: String,
    }

    impl TcpLink {
        /// Connect to a bridge at `host:port`
        pub fn connect(host: &str, port: u16) -> LinkResult<Self> {
            let addr = format!("{}:{}", host, port);
            log::info!("Connecting to {}", addr);

            let stream = TcpStream::connect(&addr)
                .map_err(|e| LinkError::ConnectionFailed(format!("{}: {}", addr, e)))?;

            stream.set_nodelay(true).map_err(|e| {
                LinkError::ConnectionFailed(format!("Failed to set TCP_NODELAY: {}", e))
            })?;
            stream
                .set_write_timeout(Some(Duration::from_secs(5)))
                .map_err(|e| {
                    LinkError::ConnectionFailed(format!("Failed to set write timeout: {}", e))
                })?;

            log::info!("Connected to {}", addr);

            Ok(Self { stream, addr })
        }
    }

    impl ByteLink for TcpLink {
        fn write(&mut self, data: &[u8]) -> LinkResult<()> {
            self.stream.write_all(data)?;
            Ok(())
        }

        fn read_up_to(&mut self, buf: &mut [u8], timeout: Duration) -> LinkResult<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            self.stream
                .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

            match self.stream.read(buf) {
                Ok(0) => Err(LinkError::Closed),
                Ok(n) => Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
                Err(e) => Err(LinkError::from(e)),
            }
        }

        fn flush(&mut self) -> LinkResult<()> {
            self.stream.flush()?;
            Ok(())
        }

        fn close(&mut self) -> LinkResult<()> {
            self.stream.flush()?;
            self.stream.shutdown(std::net::Shutdown::Both)?;
            Ok(())
        }

        fn description(&self) -> String {
            self.addr.clone()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::net::TcpListener;
        use std::thread;

        #[test]
        fn test_tcp_link_reads_and_detects_close() {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            let server = thread::spawn(move || {
                let (mut sock, _) = listener.accept().unwrap();
                let mut cmd = [0u8; 1];
                sock.read_exact(&mut cmd).unwrap();
                sock.write_all(b"D\r\n").unwrap();
                cmd[0]
            });

            let mut link = TcpLink::connect("127.0.0.1", port).unwrap();
            link.write(b"D").unwrap();
            assert_eq!(server.join().unwrap(), b'D');

            let mut buf = [0u8; 8];
            let mut got = Vec::new();
            loop {
                match link.read_up_to(&mut buf, Duration::from_millis(200)) {
                    Ok(n) => got.extend_from_slice(&buf[..n]),
                    Err(LinkError::Closed) => break,
                    Err(e) => panic!("unexpected error {}", e),
                }
            }
            assert_eq!(got, b"D\r\n");
        }
    }
}
