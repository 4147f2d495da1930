
    use super::*;
    use crate::transport::TransportError;
    use agentgate_core::{AgentId, BroadcastEvent, ErrorCode, Result};
    use async_trait::async_trait;

    /// Forwards everything it sees to channels the test can inspect.
    struct ChannelHandler {
        frames: mpsc::UnboundedSender<(ConnectionId, Frame)>,
        lost: mpsc::UnboundedSender<(ConnectionId, CloseReason)>,
    }

    #[async_trait]
    impl FrameHandler for ChannelHandler {
        async fn handle_frame(&self, origin: ConnectionId, frame: Frame) -> Result<()> {
            let _ = self.frames.send((origin, frame));
            Ok(())
        }

        async fn connection_lost(&self, id: ConnectionId, reason: CloseReason) {
            let _ = self.lost.send((id, reason));
        }
    }

    struct Harness {
        frames: mpsc::UnboundedReceiver<(ConnectionId, Frame)>,
        lost: mpsc::UnboundedReceiver<(ConnectionId, CloseReason)>,
        handler: Arc<dyn FrameHandler>,
    }

    fn harness() -> Harness {
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (lost_tx, lost) = mpsc::unbounded_channel();
        Harness {
            frames,
            lost,
            handler: Arc::new(ChannelHandler {
                frames: frames_tx,
                lost: lost_tx,
            }),
        }
    }

    fn event(n: usize) -> Frame {
        Frame::Event(BroadcastEvent::new(
            "Ping",
            AgentId::new("Pinger", "p"),
            n.to_string().into_bytes(),
        ))
    }

    fn connection(raw: u64) -> Arc<Connection> {
        Arc::new(Connection::new(
            ConnectionId::new(raw),
            None,
            CancellationToken::new(),
        ))
    }

    #[test]
    fn test_connection_id_display_and_order() {
        assert_eq!(ConnectionId::new(3).to_string(), "conn-3");
        assert!(ConnectionId::new(2) < ConnectionId::new(10));
        assert_eq!(ConnectionId::new(9).as_u64(), 9);
    }

    #[tokio::test]
    async fn test_writes_are_fifo() {
        let h = harness();
        let (transport, mut worker) = Transport::in_memory();
        let conn = connection(1);
        conn.start(transport, h.handler.clone());

        for n in 0..200 {
            assert!(conn.send(event(n)));
        }

        for n in 0..200 {
            let frame = worker.recv_timeout(Duration::from_secs(2)).await.unwrap();
            assert_eq!(frame, event(n));
        }
    }

    #[tokio::test]
    async fn test_frames_sent_before_start_are_queued() {
        let h = harness();
        let (transport, mut worker) = Transport::in_memory();
        let conn = connection(1);

        assert!(conn.send(event(1)));
        conn.start(transport, h.handler.clone());

        assert_eq!(
            worker.recv_timeout(Duration::from_secs(2)).await,
            Some(event(1))
        );
    }

    #[tokio::test]
    async fn test_inbound_frames_reach_handler() {
        let mut h = harness();
        let (transport, worker) = Transport::in_memory();
        let conn = connection(4);
        conn.start(transport, h.handler.clone());

        worker.send(event(7));
        let (origin, frame) = h.frames.recv().await.unwrap();
        assert_eq!(origin, ConnectionId::new(4));
        assert_eq!(frame, event(7));
    }

    #[tokio::test]
    async fn test_decode_error_is_answered_and_connection_survives() {
        let mut h = harness();
        let (transport, mut worker) = Transport::in_memory();
        let conn = connection(1);
        conn.start(transport, h.handler.clone());

        worker.inject_error(TransportError::Decode("expected value".into()));
        let reply = worker.recv_timeout(Duration::from_secs(2)).await.unwrap();
        match reply {
            Frame::Response(resp) => {
                assert_eq!(resp.request_id, "");
                assert_eq!(resp.error.unwrap().code, ErrorCode::InvalidFrame);
            }
            other => panic!("unexpected frame: {:?}", other),
        }

        assert!(conn.is_active());
        worker.send(event(1));
        assert!(h.frames.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_stream_end_reports_lost_once() {
        let mut h = harness();
        let (transport, worker) = Transport::in_memory();
        let conn = connection(2);
        let handle = conn.start(transport, h.handler.clone());

        worker.close();
        handle.await.unwrap();

        let (id, reason) = h.lost.recv().await.unwrap();
        assert_eq!(id, ConnectionId::new(2));
        assert_eq!(reason, CloseReason::StreamEnded);
        assert!(!conn.is_active());
        assert!(h.lost.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_io_fault_reports_lost() {
        let mut h = harness();
        let (transport, worker) = Transport::in_memory();
        let conn = connection(2);
        let handle = conn.start(transport, h.handler.clone());

        worker.inject_error(TransportError::Io("connection reset".into()));
        handle.await.unwrap();

        let (_, reason) = h.lost.recv().await.unwrap();
        assert!(matches!(reason, CloseReason::Fault(msg) if msg.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_worker_gone_reports_lost_once() {
        let mut h = harness();
        let (transport, worker) = Transport::in_memory();
        let conn = connection(5);
        let handle = conn.start(transport, h.handler.clone());

        drop(worker);
        conn.send(event(1));
        handle.await.unwrap();

        assert!(h.lost.recv().await.is_some());
        assert!(h.lost.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_not_reported() {
        let mut h = harness();
        let (transport, mut worker) = Transport::in_memory();
        let conn = connection(1);
        conn.start(transport, h.handler.clone());

        conn.close().await;
        conn.close().await;

        assert!(!conn.is_active());
        assert!(!conn.send(event(1)));
        assert!(h.lost.try_recv().is_err());
        assert!(worker.recv_timeout(Duration::from_secs(2)).await.is_none());
    }

    #[tokio::test]
    async fn test_close_before_start() {
        let h = harness();
        let conn = connection(1);
        tokio::time::timeout(Duration::from_secs(1), conn.close())
            .await
            .unwrap();

        let (transport, _worker) = Transport::in_memory();
        conn.start(transport, h.handler.clone()).await.unwrap();
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_pumps() {
        let h = harness();
        let parent = CancellationToken::new();
        let conn = Arc::new(Connection::new(
            ConnectionId::new(1),
            None,
            parent.child_token(),
        ));
        let (transport, _worker) = Transport::in_memory();
        let handle = conn.start(transport, h.handler.clone());

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!conn.is_active());
    }

    #[test]
    fn test_supported_types() {
        let conn = Connection::new(ConnectionId::new(1), None, CancellationToken::new());
        assert!(conn.add_supported_type("Echo"));
        assert!(!conn.add_supported_type("Echo"));
        assert!(conn.add_supported_type("Ping"));
        assert!(conn.supports("Echo"));

        let snapshot = conn.supported_types();
        assert_eq!(snapshot.len(), 2);

        // the snapshot is a copy
        conn.add_supported_type("Pong");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(conn.supported_types().len(), 3);
    }

    #[test]
    fn test_no_types_after_cancel() {
        let conn = Connection::new(ConnectionId::new(1), Some("peer".into()), CancellationToken::new());
        conn.cancel();
        assert!(!conn.add_supported_type("Echo"));
        assert!(conn.supported_types().is_empty());
        assert_eq!(conn.peer(), Some("peer"));
    }

    /// Records the order in which frames finish and the loss is reported.
    struct SlowHandler {
        log: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl FrameHandler for SlowHandler {
        async fn handle_frame(&self, _origin: ConnectionId, _frame: Frame) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.log.lock().unwrap().push("frame");
            Ok(())
        }

        async fn connection_lost(&self, _id: ConnectionId, _reason: CloseReason) {
            self.log.lock().unwrap().push("lost");
        }
    }

    #[tokio::test]
    async fn test_frames_read_before_stream_end_finish_first() {
        let handler = Arc::new(SlowHandler {
            log: Mutex::new(Vec::new()),
        });
        let (transport, worker) = Transport::in_memory();
        let conn = connection(12);
        let pumps = conn.start(transport, handler.clone());

        worker.send(event(1));
        worker.send(event(2));
        worker.close();

        tokio::time::timeout(Duration::from_secs(2), pumps)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*handler.log.lock().unwrap(), vec!["frame", "frame", "lost"]);
    }
