//! Naming Service Tests
//!
//! Exercises the dispatcher, registration handler, and lookup handler over
//! real TCP connections against an in-process naming server.
//!
//! ## Test Scopes
//! - **End-to-end protocol**: identity dispatch, registration ack, lookup
//!   hit/miss wire format.
//! - **Atomicity**: malformed or rejected registrations leave the registry
//!   and index untouched.
//! - **Liveness**: control-channel disconnects flip the liveness flag while
//!   stale routes keep resolving.
//! - **Shutdown**: the server and its connection tasks stop deterministically.

#[cfg(test)]
mod tests {
    use crate::naming::protocol::{
        write_line, LookupRequest, RegistrationRequest, ACK_REGISTERED, ERROR_PREFIX,
        IDENTITY_CLIENT, IDENTITY_STORAGE_SERVER,
    };
    use crate::naming::server::{NamingServer, NamingServerHandle};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader, Lines};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::TcpStream;

    type FrameReader = Lines<BufReader<OwnedReadHalf>>;

    async fn start_server(max_nodes: usize) -> (Arc<NamingServer>, NamingServerHandle) {
        let server = NamingServer::new(max_nodes);
        let handle = server
            .clone()
            .serve("127.0.0.1:0".parse().unwrap())
            .await
            .expect("failed to start naming server");
        (server, handle)
    }

    async fn connect(addr: SocketAddr) -> (FrameReader, OwnedWriteHalf) {
        let stream = TcpStream::connect(addr).await.expect("connect failed");
        let (read_half, write_half) = stream.into_split();
        (BufReader::new(read_half).lines(), write_half)
    }

    /// Registers a fake storage node and returns its open control connection.
    async fn register_node(
        addr: SocketAddr,
        ip: &str,
        data_port: u16,
        paths: &[&str],
    ) -> (FrameReader, OwnedWriteHalf) {
        let (mut lines, mut writer) = connect(addr).await;
        write_line(&mut writer, IDENTITY_STORAGE_SERVER).await.unwrap();

        let request = RegistrationRequest {
            ip: ip.parse().unwrap(),
            control_port: 8001,
            data_port,
            paths: paths.iter().map(|p| p.to_string()).collect(),
        };
        write_line(&mut writer, &request.to_line()).await.unwrap();

        let reply = lines.next_line().await.unwrap().expect("no ack");
        assert_eq!(reply, ACK_REGISTERED);
        (lines, writer)
    }

    async fn lookup(addr: SocketAddr, path: &str) -> String {
        let (mut lines, mut writer) = connect(addr).await;
        write_line(&mut writer, IDENTITY_CLIENT).await.unwrap();
        let request = LookupRequest::GetServer {
            path: path.to_string(),
        };
        write_line(&mut writer, &request.to_line()).await.unwrap();
        lines.next_line().await.unwrap().expect("no lookup reply")
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within timeout");
    }

    // ============================================================
    // END-TO-END PROTOCOL
    // ============================================================

    #[tokio::test]
    async fn test_register_then_lookup() {
        let (_server, handle) = start_server(10).await;
        let addr = handle.local_addr();

        let _control = register_node(addr, "10.0.0.5", 9001, &["a.txt", "b/c.txt"]).await;

        assert_eq!(lookup(addr, "a.txt").await, "10.0.0.5 9001");
        assert_eq!(lookup(addr, "b/c.txt").await, "10.0.0.5 9001");

        let miss = lookup(addr, "missing.txt").await;
        assert!(miss.starts_with(ERROR_PREFIX), "got: {}", miss);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_lookup_sequence_on_one_connection() {
        let (_server, handle) = start_server(10).await;
        let addr = handle.local_addr();

        let _control = register_node(addr, "10.0.0.5", 9001, &["a.txt"]).await;

        let (mut lines, mut writer) = connect(addr).await;
        write_line(&mut writer, IDENTITY_CLIENT).await.unwrap();

        for _ in 0..3 {
            write_line(&mut writer, "GET_SERVER a.txt").await.unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "10.0.0.5 9001");
        }
        write_line(&mut writer, "GET_SERVER nope.txt").await.unwrap();
        assert!(lines
            .next_line()
            .await
            .unwrap()
            .unwrap()
            .starts_with(ERROR_PREFIX));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_path_with_spaces_round_trips() {
        let (_server, handle) = start_server(10).await;
        let addr = handle.local_addr();

        let _control =
            register_node(addr, "10.0.0.7", 9007, &["dir with space/report final.txt"]).await;

        assert_eq!(
            lookup(addr, "dir with space/report final.txt").await,
            "10.0.0.7 9007"
        );

        handle.shutdown().await;
    }

    // ============================================================
    // REGISTRATION ATOMICITY
    // ============================================================

    #[tokio::test]
    async fn test_malformed_registration_leaves_state_unchanged() {
        let (server, handle) = start_server(10).await;
        let addr = handle.local_addr();

        let (mut lines, mut writer) = connect(addr).await;
        write_line(&mut writer, IDENTITY_STORAGE_SERVER).await.unwrap();
        // Declares 3 paths, supplies 2.
        write_line(&mut writer, "10.0.0.5 8001 9001 3 a.txt b.txt")
            .await
            .unwrap();

        let reply = lines.next_line().await.unwrap().expect("no error reply");
        assert!(reply.starts_with(ERROR_PREFIX), "got: {}", reply);

        assert_eq!(server.registry().len(), 0);
        assert_eq!(server.index().len(), 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_capacity_rejection_leaves_prior_registrations() {
        let (server, handle) = start_server(1).await;
        let addr = handle.local_addr();

        let _control = register_node(addr, "10.0.0.1", 9001, &["a.txt"]).await;

        let (mut lines, mut writer) = connect(addr).await;
        write_line(&mut writer, IDENTITY_STORAGE_SERVER).await.unwrap();
        write_line(&mut writer, "10.0.0.2 8002 9002 1 b.txt")
            .await
            .unwrap();

        let reply = lines.next_line().await.unwrap().expect("no rejection");
        assert!(reply.starts_with(ERROR_PREFIX), "got: {}", reply);

        assert_eq!(server.registry().len(), 1);
        assert_eq!(lookup(addr, "a.txt").await, "10.0.0.1 9001");
        assert!(lookup(addr, "b.txt").await.starts_with(ERROR_PREFIX));

        handle.shutdown().await;
    }

    // ============================================================
    // OVERWRITE & LIVENESS SEMANTICS
    // ============================================================

    #[tokio::test]
    async fn test_last_registration_wins() {
        let (_server, handle) = start_server(10).await;
        let addr = handle.local_addr();

        let _first = register_node(addr, "10.0.0.1", 9001, &["shared.txt"]).await;
        let _second = register_node(addr, "10.0.0.2", 9002, &["shared.txt"]).await;

        assert_eq!(lookup(addr, "shared.txt").await, "10.0.0.2 9002");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_dead_node_paths_still_resolve() {
        let (server, handle) = start_server(10).await;
        let addr = handle.local_addr();

        let control = register_node(addr, "10.0.0.5", 9001, &["a.txt"]).await;
        drop(control);

        let registry = server.registry().clone();
        wait_until(move || registry.alive_nodes().is_empty()).await;

        // Entry stays, flag is down, route is stale but still served.
        assert_eq!(server.registry().len(), 1);
        assert_eq!(lookup(addr, "a.txt").await, "10.0.0.5 9001");

        handle.shutdown().await;
    }

    // ============================================================
    // CONCURRENT REGISTRATION
    // ============================================================

    #[tokio::test]
    async fn test_concurrent_registrations_stay_disjoint() {
        let (server, handle) = start_server(16).await;
        let addr = handle.local_addr();

        let mut tasks = Vec::new();
        for i in 0..8u16 {
            tasks.push(tokio::spawn(async move {
                let paths = [format!("node{}/file.txt", i)];
                let path_refs: Vec<&str> = paths.iter().map(|p| p.as_str()).collect();
                register_node(addr, "127.0.0.1", 9100 + i, &path_refs).await
            }));
        }

        let mut controls = Vec::new();
        for task in tasks {
            controls.push(task.await.unwrap());
        }

        assert_eq!(server.registry().len(), 8);
        for i in 0..8u16 {
            let reply = lookup(addr, &format!("node{}/file.txt", i)).await;
            assert_eq!(reply, format!("127.0.0.1 {}", 9100 + i));
        }

        handle.shutdown().await;
    }

    // ============================================================
    // DISPATCH & PROTOCOL ERRORS
    // ============================================================

    #[tokio::test]
    async fn test_unknown_identity_closes_with_no_side_effects() {
        let (server, handle) = start_server(10).await;
        let addr = handle.local_addr();

        let (mut lines, mut writer) = connect(addr).await;
        write_line(&mut writer, "WHOEVER").await.unwrap();

        // Server closes without answering.
        assert_eq!(lines.next_line().await.unwrap(), None);
        assert_eq!(server.registry().len(), 0);
        assert_eq!(server.index().len(), 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_unrecognized_operation_closes_connection() {
        let (_server, handle) = start_server(10).await;
        let addr = handle.local_addr();

        let (mut lines, mut writer) = connect(addr).await;
        write_line(&mut writer, IDENTITY_CLIENT).await.unwrap();
        write_line(&mut writer, "PUT_SERVER a.txt").await.unwrap();

        let reply = lines.next_line().await.unwrap().expect("no error reply");
        assert!(reply.starts_with(ERROR_PREFIX), "got: {}", reply);
        assert_eq!(lines.next_line().await.unwrap(), None);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_disconnect_before_identity_is_harmless() {
        let (server, handle) = start_server(10).await;
        let addr = handle.local_addr();

        let stream = TcpStream::connect(addr).await.unwrap();
        drop(stream);

        // A later, well-formed session still works.
        let _control = register_node(addr, "10.0.0.5", 9001, &["a.txt"]).await;
        assert_eq!(server.registry().len(), 1);

        handle.shutdown().await;
    }

    // ============================================================
    // SHUTDOWN
    // ============================================================

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let (_server, handle) = start_server(10).await;
        let addr = handle.local_addr();

        let _control = register_node(addr, "10.0.0.5", 9001, &["a.txt"]).await;
        handle.shutdown().await;

        // Listener is gone; a fresh connection must fail (or be reset
        // immediately on first read).
        match TcpStream::connect(addr).await {
            Err(_) => {}
            Ok(stream) => {
                let mut lines = BufReader::new(stream).lines();
                assert!(matches!(lines.next_line().await, Ok(None) | Err(_)));
            }
        }
    }
}
