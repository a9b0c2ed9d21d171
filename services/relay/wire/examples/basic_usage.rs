//! Basic usage example for the CTMP wire protocol.

use bytes::Bytes;
use relay_wire::{checksum, FrameBuilder, FrameReader};
use std::io::Cursor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== CTMP Wire Protocol Example ===\n");

    // 1. Create a plain frame
    println!("1. Creating a plain frame...");
    let plain = FrameBuilder::new(Bytes::from_static(b"Hello")).build()?;
    println!("   Encoded: {:02X?}", &plain[..]);

    // 2. Create a sensitive frame
    println!("\n2. Creating a sensitive frame...");
    let sensitive = FrameBuilder::new(Bytes::from_static(b"Hello, relay!"))
        .sensitive(true)
        .build()?;
    let stored = u16::from_be_bytes([sensitive[4], sensitive[5]]);
    println!("   Checksum field: 0x{:04X}", stored);
    println!("   Verifies: {}", checksum::verify(&sensitive, stored));

    // 3. Read both back from a stream
    println!("\n3. Reading frames from a stream...");
    let mut wire = plain.to_vec();
    wire.extend_from_slice(&sensitive);
    let mut stream = Cursor::new(wire);
    let reader = FrameReader::new();

    for _ in 0..2 {
        let frame = reader.read_frame(&mut stream).await?;
        println!(
            "   {} body bytes, sensitive={}: {:?}",
            frame.body().len(),
            frame.header.is_sensitive(),
            String::from_utf8_lossy(frame.body())
        );
    }

    // 4. Tamper with the sensitive frame
    println!("\n4. Flipping one body bit...");
    let mut tampered = sensitive.to_vec();
    tampered[10] ^= 0x01;
    match reader.read_frame(&mut Cursor::new(tampered)).await {
        Ok(_) => println!("   Unexpectedly accepted"),
        Err(e) => println!(
            "   Rejected: {} (connection fatal: {})",
            e,
            e.is_connection_fatal()
        ),
    }

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
