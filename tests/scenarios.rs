//! End-to-end scenarios exercising more than one module together.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use unisys::ipc::AccessMode;
use unisys::sema::Semaphore;
use unisys::shmbuf::ShmBuffer;
use unisys::socket::{Protocol, Socket, Type};
use unisys::socketaddr::{Family, SocketAddr};

/// S1: a UDP sender/receiver pair exchanges many fixed-size datagrams over
/// loopback without loss or corruption.
#[test]
fn s1_udp_echo_many_datagrams() {
    let mut receiver = Socket::new(Family::Inet, Type::Datagram, Protocol::Udp).unwrap();
    receiver.bind(&SocketAddr::new_loopback(Family::Inet, 0), true).unwrap();
    let bound_port = local_port(&receiver);

    let sender = Socket::new(Family::Inet, Type::Datagram, Protocol::Udp).unwrap();
    let target = SocketAddr::new("127.0.0.1", bound_port).unwrap();

    let payload = b"This is a socket test data!\0";
    for _ in 0..50 {
        let sent = sender.send_to(&target, payload).unwrap();
        assert_eq!(sent, payload.len());
        let mut buf = [0u8; 64];
        let (n, _from) = receiver.receive_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], payload);
    }
}

/// S2: a TCP client/server pair completes a three-way handshake and
/// exchanges a sustained stream of bytes whose totals match on both ends.
#[test]
fn s2_tcp_handshake_and_sustained_transfer() {
    let mut listener = Socket::new(Family::Inet, Type::Stream, Protocol::Tcp).unwrap();
    listener.bind(&SocketAddr::new_loopback(Family::Inet, 0), true).unwrap();
    listener.listen().unwrap();
    let port = local_port(&listener);

    let server = thread::spawn(move || {
        let conn = listener.accept().unwrap();
        assert!(conn.is_connected());
        let mut total = 0usize;
        let mut buf = [0u8; 256];
        let deadline = std::time::Instant::now() + Duration::from_millis(500);
        while total < 8000 && std::time::Instant::now() < deadline {
            let n = conn.receive(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        total
    });

    // Give the listener a moment to be ready to accept.
    thread::sleep(Duration::from_millis(20));

    let mut client = Socket::new(Family::Inet, Type::Stream, Protocol::Tcp).unwrap();
    client.connect(&SocketAddr::new("127.0.0.1", port).unwrap()).unwrap();
    assert!(client.is_connected());

    let chunk = [7u8; 200];
    let mut sent_total = 0usize;
    for _ in 0..40 {
        sent_total += client.send(&chunk).unwrap();
    }

    let received_total = server.join().unwrap();
    assert_eq!(received_total, sent_total);
}

/// S3: a shared-memory ring buffer stands in for two cooperating processes;
/// one thread writes, the other drains, and every byte sent is the byte
/// received, preserving order.
#[test]
fn s3_shared_ring_buffer_across_threads() {
    let name = format!("unisys-scenario-shmbuf-{}", std::process::id());
    let mut writer = ShmBuffer::new(&name, 64).unwrap();

    let written = Arc::new(std::sync::Mutex::new(Vec::new()));
    let written_clone = Arc::clone(&written);

    let producer = thread::spawn(move || {
        for i in 0u8..200 {
            let byte = [i];
            loop {
                if writer.write(&byte).unwrap() == 1 {
                    written_clone.lock().unwrap().push(i);
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
        }
    });

    let name_for_reader = name.clone();
    let consumer = thread::spawn(move || {
        let mut reader = ShmBuffer::new(&name_for_reader, 64).unwrap();
        let mut received = Vec::new();
        while received.len() < 200 {
            let mut byte = [0u8; 1];
            let n = reader.read(&mut byte).unwrap();
            if n == 1 {
                received.push(byte[0]);
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
        received
    });

    producer.join().unwrap();
    let received = consumer.join().unwrap();
    let expected: Vec<u8> = (0u8..200).collect();
    assert_eq!(received, expected);
    assert_eq!(*written.lock().unwrap(), expected);
}

/// S4: parsing the fixture INI text round-trips every typed accessor to the
/// exact values the fixture encodes.
#[test]
fn s4_ini_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "[empty_section]\n\
         [numeric_section]\n\
         int_parameter_1 = 4\n\
         float_parameter_1 = 3.24\n\
         [string_section]\n\
         string_parameter_1 = \"Test string\"\n\
         string_parameter_2 = \"Test string with #'\"\n\
         [list_section]\n\
         boolean_parameter_2 = false\n\
         list_parameter_1 = {1 2 6 9}\n"
    )
    .unwrap();
    file.flush().unwrap();

    let mut ini = unisys::inifile::IniFile::new(file.path());
    ini.parse().unwrap();

    let sections: Vec<String> = ini.sections().iter().cloned().collect();
    assert_eq!(sections.len(), 3);
    assert!(!sections.iter().any(|s| s == "empty_section"));

    assert_eq!(ini.parameter_int("numeric_section", "int_parameter_1", -1), 4);
    assert_eq!(ini.parameter_double("numeric_section", "float_parameter_1", -1.0), 3.24);
    assert_eq!(ini.parameter_string("string_section", "string_parameter_2", ""), "Test string with #'");
    assert_eq!(ini.parameter_bool("list_section", "boolean_parameter_2", true), false);

    let list = ini.parameter_list("list_section", "list_parameter_1").unwrap();
    let sum: i64 = list.iter().map(|s| s.parse::<i64>().unwrap()).sum();
    assert_eq!(list.len(), 4);
    assert_eq!(sum, 18);
}

/// S5: the dynamic loader finds a known symbol in the current process's own
/// C library and reports no symbol for a name that can't exist.
#[test]
#[cfg(unix)]
fn s5_dynamic_lookup_self_load() {
    let path = self_library_path();
    let mut lib = unisys::dl::Library::new(path).unwrap();
    assert!(lib.get_symbol("malloc").is_some());
    assert!(lib.get_symbol("there_is_no_such_a_symbol_in_libc_xyz").is_none());
    assert!(unisys::dl::Library::is_ref_counted());
}

#[cfg(unix)]
fn self_library_path() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "/usr/lib/libSystem.B.dylib"
    }
    #[cfg(not(target_os = "macos"))]
    {
        "/lib/x86_64-linux-gnu/libc.so.6"
    }
}

/// S6: two threads contend for a named semaphore guarding a shared counter;
/// with mutual exclusion in place, every increment lands and the final
/// count matches the total number of increments attempted.
#[test]
#[cfg(unix)]
fn s6_named_semaphore_mutual_exclusion() {
    let name = format!("unisys-scenario-sema-{}", std::process::id());
    let sem = Arc::new(Semaphore::with_posix(&name, 1, AccessMode::CreateOrOpen).unwrap());
    let counter = Arc::new(std::sync::Mutex::new(0u64));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let sem = Arc::clone(&sem);
        let counter = Arc::clone(&counter);
        handles.push(thread::spawn(move || {
            for _ in 0..1000 {
                sem.access(|| {
                    let mut guard = counter.lock().unwrap();
                    *guard += 1;
                })
                .unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(*counter.lock().unwrap(), 2000);
}

fn local_port(s: &Socket) -> u16 {
    s.local_address().unwrap().port()
}
