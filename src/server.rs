//! Scan-only TCP server: accepts connections, dispatches each onto a
//! worker thread drawn from [Pool], and runs multiple request-response
//! cycles per connection. Modeled on the teacher's
//! `util::thread::Thread`/`Tx` gen-server pattern -- each worker's main
//! loop receives accepted [TcpStream]s over a channel rather than
//! spawning a thread per connection directly.

use std::{
    convert::TryInto,
    ffi,
    io::{Read, Write},
    net::{TcpListener, TcpStream},
    sync::{Arc, Mutex},
};

use crate::{
    err_at,
    manager::Database,
    scan::{self, ScanRequest},
    util::thread::Pool,
    Error, Result,
};

/// Read and answer request-response cycles on one connection until EOF
/// or an I/O error, holding `db`'s coarse lock only around the part of
/// each cycle that actually consults the stores.
pub(crate) fn serve_connection(db: &Arc<Mutex<Database>>, mut stream: TcpStream) -> Result<()> {
    loop {
        let mut header = [0u8; 8];
        match stream.read_exact(&mut header) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return err_at!(IOError, Err(err)),
        }

        let request_type = u32::from_ne_bytes(header[0..4].try_into().unwrap());
        let request_count = u32::from_ne_bytes(header[4..8].try_into().unwrap()) as usize;
        let hash_width = scan::hash_width_for_request_type(request_type)?;

        let mut body = vec![0u8; request_count * hash_width];
        err_at!(IOError, stream.read_exact(&mut body))?;

        let mut frame = header.to_vec();
        frame.extend_from_slice(&body);
        let request = ScanRequest::decode(&frame)?;

        let matches = {
            let db = db.lock().unwrap();
            scan::scan_list(&db, &request.hashes)?
        };

        let response = scan::encode_response(&matches);
        err_at!(IOError, stream.write_all(&response))?;
    }
}

/// Run the scan-only server forever, accepting connections on `port` and
/// dispatching each onto `pool_size` worker threads (default: number of
/// cores). Never returns except on a fatal bind/accept error.
pub fn serve(dir: &ffi::OsStr, port: u16, pool_size: Option<usize>) -> Result<()> {
    let db = Arc::new(Mutex::new(Database::open(dir)?));

    let mut pool: Pool<TcpStream> = Pool::new("hashdb-scan");
    if let Some(n) = pool_size {
        pool.set_pool_size(n);
    }
    pool.spawn(move |rx| {
        let db = Arc::clone(&db);
        move || {
            while let Ok((stream, _reply)) = rx.recv() {
                if let Err(err) = serve_connection(&db, stream) {
                    log::warn!("scan session ended: {}", err);
                }
            }
        }
    });

    let listener = err_at!(IOError, TcpListener::bind(("0.0.0.0", port)))?;
    log::info!("hashdb scan server listening on port {}", port);
    for stream in listener.incoming() {
        let stream = err_at!(IOError, stream)?;
        pool.post(stream)?;
    }
    pool.close_wait()?;
    Ok(())
}

#[cfg(test)]
#[path = "server_test.rs"]
mod server_test;
