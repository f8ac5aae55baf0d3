#[cfg(test)]
mod integration_tests {
    use litefs::config::{AppConfig, RouteConfig, ServerConfig};
    use litefs::http::Method;
    use litefs::server::Server;
    use mio::Poll;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;
    use std::{fs, thread};

    #[test]
    fn test_server_upload_and_close() {
        let test_root = "./tmp_test_root_upload";
        let upload_path = "./tmp_test_root_upload/uploads";

        let _ = fs::remove_dir_all(test_root);
        fs::create_dir_all(upload_path).expect("Failed to create test directories");

        let mut config = AppConfig::default();

        let mut router1 = RouteConfig::default();
        router1.path = "/upload".to_string();
        router1.root = test_root.to_string();
        router1.upload_dir = "uploads".to_string();
        router1.methods = vec![Method::POST.to_string(), Method::GET.to_string()];

        let server_cfg = ServerConfig {
            server_name: "127.0.0.1".to_string(),
            ports: vec![8090],
            root: test_root.to_string(),
            routes: vec![router1],
            default_server: true,
            client_max_body_size: 1024 * 1024,
            ..Default::default()
        };
        config.servers.push(server_cfg);

        thread::spawn(move || {
            let poll = Poll::new().unwrap();
            let server = Server::new(config, &poll).unwrap();
            server.run(poll).unwrap();
        });

        thread::sleep(Duration::from_millis(300));

        let mut stream = TcpStream::connect("127.0.0.1:8090").expect("Failed to connect to server");
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let body = b"Hello World!";
        let request = format!(
            "POST /upload/test.txt HTTP/1.1\r\n\
             Host: 127.0.0.1:8090\r\n\
             Content-Type: text/plain\r\n\
             Content-Length: {}\r\n\r\n",
            body.len()
        );

        stream.write_all(request.as_bytes()).unwrap();
        stream.write_all(body).unwrap();
        stream.flush().unwrap();

        let mut buffer = [0u8; 4096];
        let n = stream.read(&mut buffer).expect("no response from server");
        let response = String::from_utf8_lossy(&buffer[..n]);
        assert!(response.contains("201 Created") || response.contains("200 OK"));
        assert!(response.to_lowercase().contains("connection: close"));

        // The connection is closed right after the response: a further read
        // returns EOF rather than a second response.
        let trailing = stream.read(&mut buffer).unwrap_or(0);
        assert_eq!(trailing, 0, "server kept the connection open after responding");

        let paths = fs::read_dir(upload_path).unwrap();
        let mut found_content = false;
        for path in paths {
            let file_path = path.unwrap().path();
            if file_path.is_file() && fs::read_to_string(&file_path).unwrap() == "Hello World!" {
                found_content = true;
            }
        }
        assert!(found_content, "uploaded body was not written to disk");

        let _ = fs::remove_dir_all(test_root);
    }

    #[test]
    fn test_chunked_transfer_encoding_is_rejected() {
        let test_root = "./tmp_test_root_chunked";
        let _ = fs::remove_dir_all(test_root);
        fs::create_dir_all(test_root).unwrap();

        let mut config = AppConfig::default();
        let mut router1 = RouteConfig::default();
        router1.path = "/".to_string();
        router1.root = test_root.to_string();

        let server_cfg = ServerConfig {
            server_name: "127.0.0.1".to_string(),
            ports: vec![8091],
            root: test_root.to_string(),
            routes: vec![router1],
            default_server: true,
            ..Default::default()
        };
        config.servers.push(server_cfg);

        thread::spawn(move || {
            let poll = Poll::new().unwrap();
            let server = Server::new(config, &poll).unwrap();
            server.run(poll).unwrap();
        });

        thread::sleep(Duration::from_millis(300));

        let mut stream = TcpStream::connect("127.0.0.1:8091").unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

        let request = "POST /upload HTTP/1.1\r\n\
                       Host: 127.0.0.1:8091\r\n\
                       Transfer-Encoding: chunked\r\n\
                       Content-Type: text/plain\r\n\r\n\
                       5\r\nHello\r\n0\r\n\r\n";
        stream.write_all(request.as_bytes()).unwrap();
        stream.flush().unwrap();

        let mut buffer = [0u8; 4096];
        let n = stream.read(&mut buffer).unwrap();
        let response = String::from_utf8_lossy(&buffer[..n]);
        assert!(response.contains("501"), "expected 501 Not Implemented, got: {response}");

        let _ = fs::remove_dir_all(test_root);
    }
}
