use std::time::Duration;

use chat_server::{ChatServer, ServerConfig, TlsFiles};
use protocol::{dial, ClientTls, ClientTlsOptions, Connection, Network, USERNAME_TAKEN};
use tokio::time::timeout;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// 在临时端口上启动服务器，返回实际地址
async fn start_server(config: ServerConfig) -> String {
    let server = ChatServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

fn local_config(name: &str) -> ServerConfig {
    ServerConfig {
        name: name.to_string(),
        network: Network::Tcp,
        address: "127.0.0.1:0".to_string(),
        tls: None,
    }
}

/// 无分帧协议下多条广播可能合并到一次读取里，这里累积到出现期望文本为止
async fn read_until(conn: &mut Connection, expected: &str) -> String {
    let mut received = String::new();
    while !received.contains(expected) {
        let chunk = timeout(READ_TIMEOUT, conn.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {expected:?}, got {received:?}"))
            .unwrap();
        received.push_str(&chunk);
    }
    received
}

/// 完成握手并加入，返回连接
async fn join(network: Network, addr: &str, tls: Option<&ClientTls>, name: &str) -> Connection {
    let mut conn = dial(network, addr, tls).await.unwrap();
    conn.recv().await.unwrap();
    conn.send(name).await.unwrap();
    read_until(&mut conn, &format!("{name} has joined\n")).await;
    conn
}

#[tokio::test]
async fn test_chat_session_end_to_end() {
    let addr = start_server(local_config("Chatroom")).await;

    // A 加入
    let mut alice = dial(Network::Tcp, &addr, None).await.unwrap();
    assert_eq!(alice.recv().await.unwrap(), "Chatroom");
    alice.send("alice").await.unwrap();
    assert_eq!(
        read_until(&mut alice, "alice has joined\n").await,
        "alice has joined\n"
    );

    // B 先用重名被拒，再换名加入
    let mut bob = dial(Network::Tcp, &addr, None).await.unwrap();
    assert_eq!(bob.recv().await.unwrap(), "Chatroom");
    bob.send("alice").await.unwrap();
    assert_eq!(bob.recv().await.unwrap(), USERNAME_TAKEN);
    bob.send("bob").await.unwrap();
    read_until(&mut bob, "bob has joined\n").await;
    read_until(&mut alice, "bob has joined\n").await;

    // A 说话，B 收到带署名的消息
    alice.send("hello").await.unwrap();
    read_until(&mut bob, "alice: hello\n").await;
    read_until(&mut alice, "alice: hello\n").await;

    // A 断开，B 收到离开通知
    drop(alice);
    read_until(&mut bob, "alice has left\n").await;
}

#[tokio::test]
async fn test_name_is_free_again_after_leave() {
    let addr = start_server(local_config("Chatroom")).await;

    let mut watcher = join(Network::Tcp, &addr, None, "watcher").await;
    let alice = join(Network::Tcp, &addr, None, "alice").await;
    drop(alice);
    read_until(&mut watcher, "alice has left\n").await;

    let mut again = dial(Network::Tcp, &addr, None).await.unwrap();
    again.recv().await.unwrap();
    again.send("alice").await.unwrap();
    let reply = read_until(&mut again, "has joined\n").await;
    assert!(!reply.contains("Username already taken"));
}

#[tokio::test]
async fn test_racing_same_name_exactly_one_wins() {
    const N: usize = 8;
    let server = ChatServer::bind(local_config("Race")).await.unwrap();
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    tokio::spawn(server.run());

    let mut conns = Vec::new();
    for _ in 0..N {
        let mut conn = dial(Network::Tcp, &addr, None).await.unwrap();
        conn.recv().await.unwrap();
        conns.push(conn);
    }
    for conn in conns.iter_mut() {
        conn.send("same-name").await.unwrap();
    }

    let mut winners = 0;
    let mut rejected = 0;
    for conn in conns.iter_mut() {
        let reply = timeout(READ_TIMEOUT, conn.recv()).await.unwrap().unwrap();
        if reply.contains("Username already taken") {
            rejected += 1;
        } else {
            assert!(reply.starts_with("same-name has joined\n"));
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(rejected, N - 1);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_broadcast_order_is_shared_by_all_recipients() {
    let addr = start_server(local_config("Order")).await;

    let mut alice = join(Network::Tcp, &addr, None, "alice").await;
    let mut bob = join(Network::Tcp, &addr, None, "bob").await;
    read_until(&mut alice, "bob has joined\n").await;

    for text in ["m1", "m2", "m3"] {
        alice.send(text).await.unwrap();
        read_until(&mut alice, &format!("alice: {text}\n")).await;
    }

    let expected = "alice: m1\nalice: m2\nalice: m3\n";
    assert!(read_until(&mut bob, "alice: m3\n").await.ends_with(expected));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_socket_chatroom() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chatroom.sock");
    let addr = start_server(ServerConfig {
        name: "Local".to_string(),
        network: Network::Unix,
        address: path.to_str().unwrap().to_string(),
        tls: None,
    })
    .await;

    let mut alice = join(Network::Unix, &addr, None, "alice").await;
    let mut bob = join(Network::Unix, &addr, None, "bob").await;
    bob.send("hi").await.unwrap();
    read_until(&mut alice, "bob: hi\n").await;
}

#[tokio::test]
async fn test_tls_chatroom() {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let cert_file = dir.path().join("cert.pem");
    let key_file = dir.path().join("key.pem");
    std::fs::write(&cert_file, certified.cert.pem()).unwrap();
    std::fs::write(&key_file, certified.key_pair.serialize_pem()).unwrap();

    let addr = start_server(ServerConfig {
        tls: Some(TlsFiles {
            cert_file,
            key_file,
        }),
        ..local_config("Secure")
    })
    .await;

    let client_tls = ClientTls::new(&ClientTlsOptions {
        insecure_skip_verify: true,
        ..Default::default()
    })
    .unwrap();

    let mut alice = dial(Network::Tcp, &addr, Some(&client_tls)).await.unwrap();
    assert_eq!(alice.recv().await.unwrap(), "Secure");
    alice.send("alice").await.unwrap();
    read_until(&mut alice, "alice has joined\n").await;

    // 明文客户端握手失败不影响监听
    let mut plain = dial(Network::Tcp, &addr, None).await.unwrap();
    plain.send("not tls").await.unwrap();
    let _ = timeout(READ_TIMEOUT, plain.recv()).await;

    let mut bob = join(Network::Tcp, &addr, Some(&client_tls), "bob").await;
    read_until(&mut alice, "bob has joined\n").await;
    bob.send("secret").await.unwrap();
    read_until(&mut alice, "bob: secret\n").await;
}

#[tokio::test]
async fn test_missing_tls_material_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let result = ChatServer::bind(ServerConfig {
        tls: Some(TlsFiles {
            cert_file: dir.path().join("missing-cert.pem"),
            key_file: dir.path().join("missing-key.pem"),
        }),
        ..local_config("Broken")
    })
    .await;
    assert!(result.is_err());
}
