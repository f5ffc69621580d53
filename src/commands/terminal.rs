//! Interactive terminal mode
//!
//! The link is moved into a worker thread that owns it for the whole
//! session. Lines typed on stdin reach the worker over one channel, device
//! output comes back over another and is printed by the main thread.

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use nandump_core::{ByteLink, LinkResult};

use crate::links::BoxedLink;

/// Read window of the worker between two command checks
const POLL: Duration = Duration::from_millis(50);

/// Forward commands to the link and device output back until the command
/// channel closes
///
/// After the last command, output keeps being forwarded until the device
/// goes quiet.
fn link_worker<L: ByteLink>(
    mut link: L,
    commands: Receiver<Vec<u8>>,
    output: Sender<Vec<u8>>,
) -> LinkResult<()> {
    let mut buf = [0u8; 256];
    let mut draining = false;

    loop {
        if !draining {
            match commands.try_recv() {
                Ok(cmd) => {
                    link.write(&cmd)?;
                    link.flush()?;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => draining = true,
            }
        }

        let n = link.read_up_to(&mut buf, POLL)?;
        if n > 0 {
            if output.send(buf[..n].to_vec()).is_err() {
                break;
            }
        } else if draining {
            break;
        }
    }

    link.close()
}

/// Run the interactive terminal until stdin is closed
pub fn run(link: BoxedLink) -> Result<(), Box<dyn std::error::Error>> {
    println!("Interactive mode. Type commands (R, I, S, G, D, V). Ctrl+D to exit.");

    let (cmd_tx, cmd_rx) = unbounded::<Vec<u8>>();
    let (out_tx, out_rx) = unbounded::<Vec<u8>>();

    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let mut bytes = line.into_bytes();
            bytes.push(b'\r');
            if cmd_tx.send(bytes).is_err() {
                break;
            }
        }
    });

    let worker = thread::spawn(move || link_worker(link, cmd_rx, out_tx));

    let mut stdout = io::stdout();
    for chunk in out_rx.iter() {
        stdout.write_all(String::from_utf8_lossy(&chunk).as_bytes())?;
        stdout.flush()?;
    }

    let result = worker
        .join()
        .map_err(|_| "terminal worker panicked")?;
    println!("\nExiting interactive mode.");
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nandump_core::{EndOfScript, LinkError, ReplayLink};

    #[test]
    fn test_worker_forwards_both_ways() {
        let mut link = ReplayLink::from_bytes(*b"R\r\nOK:RESET\r\n> ").end_with(EndOfScript::Silence);
        let (cmd_tx, cmd_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();

        cmd_tx.send(b"R\r".to_vec()).unwrap();
        drop(cmd_tx);
        link_worker(&mut link, cmd_rx, out_tx).unwrap();

        let output: Vec<u8> = out_rx.iter().flatten().collect();
        assert_eq!(output, b"R\r\nOK:RESET\r\n> ");
        assert_eq!(link.written(), b"R\r");
    }

    #[test]
    fn test_worker_reports_closed_link() {
        let link = ReplayLink::new();
        let (_cmd_tx, cmd_rx) = unbounded();
        let (out_tx, _out_rx) = unbounded();
        assert!(matches!(
            link_worker(link, cmd_rx, out_tx),
            Err(LinkError::Closed)
        ));
    }
}
