//! 테스트용 HTTP 서버 (연결마다 응답 하나, `Connection: close`)

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use url::Url;

pub(crate) struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Reply {
    pub(crate) fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::status(200, body)
    }

    pub(crate) fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub(crate) fn redirect(location: &str) -> Self {
        Self::status(302, Vec::new()).header("Location", location)
    }

    pub(crate) fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

pub(crate) struct TestServer {
    base: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub(crate) fn start<H>(handler: H) -> Self
    where
        H: Fn(&str) -> Reply + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let base = format!("http://{}", listener.local_addr().expect("local addr"));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let _ = serve(stream, &handler, &log);
            }
        });

        Self { base, requests }
    }

    pub(crate) fn url(&self, path: &str) -> Url {
        Url::parse(&format!("{}{}", self.base, path)).expect("valid test url")
    }

    /// 지금까지 받은 요청 헤더 (요청 줄 포함)
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("request log").clone()
    }
}

fn serve<H>(mut stream: TcpStream, handler: &H, log: &Mutex<Vec<String>>) -> io::Result<()>
where
    H: Fn(&str) -> Reply,
{
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut head = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" {
            break;
        }
        head.push_str(&line);
    }

    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    if let Ok(mut requests) = log.lock() {
        requests.push(head);
    }

    let reply = handler(&path);
    let reason = match reply.status {
        200 => "OK",
        302 => "Found",
        404 => "Not Found",
        _ => "Status",
    };
    write!(stream, "HTTP/1.1 {} {}\r\n", reply.status, reason)?;
    for (name, value) in &reply.headers {
        write!(stream, "{name}: {value}\r\n")?;
    }
    write!(
        stream,
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        reply.body.len()
    )?;
    stream.write_all(&reply.body)?;
    stream.flush()
}
