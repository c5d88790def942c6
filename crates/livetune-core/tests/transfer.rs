//! Bulk download/upload/verify tests against the simulated ECU

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::{Arc, Mutex};

    use anyhow::Result;

    use livetune_core::protocol::{CanConfig, EcuClient, SimEcu, SimTransport};
    use livetune_core::transfer::{
        download, download_verify, upload, upload_verify, verify, NullObserver, TransferError,
        TransferObserver, TransferOptions,
    };

    const CAL_BASE: u32 = 0x0002_0000;

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    fn open_sim(ecu: SimEcu) -> (EcuClient, Arc<Mutex<SimEcu>>) {
        let transport = SimTransport::new(ecu);
        let handle = transport.handle();
        let mut client = EcuClient::new(CanConfig::default());
        client.open_with(Box::new(transport));
        (client, handle)
    }

    #[derive(Default)]
    struct RecordingObserver {
        logs: Vec<String>,
        total: Option<u64>,
        last: u64,
        ended: bool,
        abort: bool,
        /// Raise the abort flag once this many bytes are done
        abort_at: Option<u64>,
    }

    impl TransferObserver for RecordingObserver {
        fn log(&mut self, msg: &str) {
            self.logs.push(msg.to_string());
        }
        fn progress_start(&mut self, total: u64) {
            self.total = Some(total);
        }
        fn progress(&mut self, current: u64) {
            self.last = current;
            if matches!(self.abort_at, Some(at) if current >= at) {
                self.abort = true;
            }
        }
        fn progress_end(&mut self) {
            self.ended = true;
        }
        fn aborted(&self) -> bool {
            self.abort
        }
    }

    #[test]
    fn test_download_roundtrip() -> Result<()> {
        let data = image(300);
        let mut ecu = SimEcu::with_seed(1);
        ecu.load_region(CAL_BASE, &data);
        let (mut client, _) = open_sim(ecu);

        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("calrom.bin");

        let mut obs = RecordingObserver::default();
        download(
            &mut client,
            CAL_BASE,
            data.len(),
            &dest,
            &TransferOptions::default(),
            &mut obs,
        )?;

        assert_eq!(fs::read(&dest)?, data);
        assert_eq!(obs.total, Some(300));
        assert_eq!(obs.last, 300);
        assert!(obs.ended);
        Ok(())
    }

    #[test]
    fn test_upload_lands_in_ecu_memory() -> Result<()> {
        let data = image(200);
        let dir = tempfile::tempdir()?;
        let src = dir.path().join("patch.bin");
        fs::write(&src, &data)?;

        let (mut client, handle) = open_sim(SimEcu::with_seed(2));
        upload(
            &mut client,
            CAL_BASE,
            &src,
            None,
            &TransferOptions::default(),
            &mut NullObserver,
        )?;

        assert_eq!(handle.lock().unwrap().bytes(CAL_BASE, 200), data);
        Ok(())
    }

    #[test]
    fn test_upload_range_window() {
        let data = image(100);
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("full.bin");
        fs::write(&src, &data).unwrap();

        let (mut client, handle) = open_sim(SimEcu::with_seed(3));
        upload(
            &mut client,
            0x1000,
            &src,
            Some((10, 20)),
            &TransferOptions::default(),
            &mut NullObserver,
        )
        .unwrap();

        assert_eq!(handle.lock().unwrap().bytes(0x1000, 20), &data[10..30]);
    }

    #[test]
    fn test_verify_reports_first_divergent_address() {
        let data = image(300);
        let mut ecu = SimEcu::with_seed(4);
        ecu.load_region(CAL_BASE, &data);
        // Flip one byte in the second chunk.
        let mut corrupted = data.clone();
        corrupted[130] ^= 0xFF;
        ecu.load_region(CAL_BASE, &corrupted);

        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.bin");
        fs::write(&reference, &data).unwrap();

        let (mut client, _) = open_sim(ecu);
        let err = verify(
            &mut client,
            CAL_BASE,
            &reference,
            &TransferOptions::default(),
            &mut NullObserver,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            TransferError::VerifyMismatch { address } if address == CAL_BASE + 130
        ));
    }

    #[test]
    fn test_download_verify_roundtrip() {
        let data = image(517); // ends on a 5-byte buffered tail
        let mut ecu = SimEcu::with_seed(5);
        ecu.load_region(CAL_BASE, &data);
        let (mut client, _) = open_sim(ecu);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dump.bin");
        download_verify(
            &mut client,
            CAL_BASE,
            data.len(),
            &dest,
            &TransferOptions::default(),
            &mut NullObserver,
        )
        .unwrap();
        assert_eq!(fs::read(&dest).unwrap().len(), 517);
    }

    #[test]
    fn test_upload_verify_roundtrip() {
        let data = image(131); // 128 + a 3-byte tail, split into 2 + 1
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("cal.bin");
        fs::write(&src, &data).unwrap();

        let (mut client, handle) = open_sim(SimEcu::with_seed(6));
        upload_verify(
            &mut client,
            CAL_BASE,
            &src,
            &TransferOptions::default(),
            &mut NullObserver,
        )
        .unwrap();
        assert_eq!(handle.lock().unwrap().bytes(CAL_BASE, 131), data);
    }

    #[test]
    fn test_abort_leaves_no_destination_file() {
        let mut ecu = SimEcu::with_seed(7);
        ecu.load_region(CAL_BASE, &image(300));
        let (mut client, _) = open_sim(ecu);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("partial.bin");

        let mut obs = RecordingObserver {
            abort: true,
            ..Default::default()
        };
        let err = download(
            &mut client,
            CAL_BASE,
            300,
            &dest,
            &TransferOptions::default(),
            &mut obs,
        )
        .unwrap_err();

        assert!(matches!(err, TransferError::Aborted));
        assert!(!dest.exists());
        assert!(!dir.path().join(".partial.bin.part").exists());
    }

    #[test]
    fn test_upload_abort_stops_after_current_chunk() -> Result<()> {
        let data = image(300);
        let dir = tempfile::tempdir()?;
        let src = dir.path().join("cal.bin");
        fs::write(&src, &data)?;

        let (mut client, handle) = open_sim(SimEcu::with_seed(9));
        let mut obs = RecordingObserver {
            abort_at: Some(1),
            ..Default::default()
        };
        let err = upload(
            &mut client,
            CAL_BASE,
            &src,
            None,
            &TransferOptions::default(),
            &mut obs,
        )
        .unwrap_err();

        assert!(matches!(err, TransferError::Aborted));
        // The first 128-byte chunk landed; nothing past it was written.
        let ecu = handle.lock().unwrap();
        assert_eq!(ecu.bytes(CAL_BASE, 128), &data[..128]);
        assert_eq!(ecu.bytes(CAL_BASE + 128, 172), vec![0u8; 172]);
        Ok(())
    }

    #[test]
    fn test_verify_abort() -> Result<()> {
        let data = image(300);
        let mut ecu = SimEcu::with_seed(10);
        ecu.load_region(CAL_BASE, &data);
        let (mut client, _) = open_sim(ecu);

        let dir = tempfile::tempdir()?;
        let reference = dir.path().join("ref.bin");
        fs::write(&reference, &data)?;

        let mut obs = RecordingObserver {
            abort: true,
            ..Default::default()
        };
        let err = verify(
            &mut client,
            CAL_BASE,
            &reference,
            &TransferOptions::default(),
            &mut obs,
        )
        .unwrap_err();
        assert!(matches!(err, TransferError::Aborted));
        Ok(())
    }

    #[test]
    fn test_chunk_pause_is_honored() -> Result<()> {
        let data = image(200);
        let mut ecu = SimEcu::with_seed(11);
        ecu.load_region(CAL_BASE, &data);
        let (mut client, _) = open_sim(ecu);

        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("out.bin");
        let opts = TransferOptions {
            chunk_size: 64,
            chunk_pause: Some(std::time::Duration::from_millis(2)),
            ..Default::default()
        };

        // 200 bytes at chunk 64 pauses after each of the 4 chunks.
        let start = std::time::Instant::now();
        download(&mut client, CAL_BASE, 200, &dest, &opts, &mut NullObserver)?;
        assert!(start.elapsed() >= std::time::Duration::from_millis(8));
        assert_eq!(fs::read(&dest)?, data);
        Ok(())
    }

    #[test]
    fn test_failed_rename_removes_temp_file() -> Result<()> {
        let mut ecu = SimEcu::with_seed(12);
        ecu.load_region(CAL_BASE, &image(8));
        let (mut client, _) = open_sim(ecu);

        // A directory at the destination path makes the final rename fail.
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("out.bin");
        fs::create_dir(&dest)?;

        let err = download(
            &mut client,
            CAL_BASE,
            8,
            &dest,
            &TransferOptions::default(),
            &mut NullObserver,
        )
        .unwrap_err();

        assert!(matches!(err, TransferError::Io(_)));
        assert!(!dir.path().join(".out.bin.part").exists());
        Ok(())
    }

    #[test]
    fn test_failed_temp_write_does_not_create_destination() -> Result<()> {
        let mut ecu = SimEcu::with_seed(13);
        ecu.load_region(CAL_BASE, &image(8));
        let (mut client, _) = open_sim(ecu);

        // A directory squatting on the temp path makes the temp write fail.
        let dir = tempfile::tempdir()?;
        fs::create_dir(dir.path().join(".out.bin.part"))?;

        let err = download(
            &mut client,
            CAL_BASE,
            8,
            dir.path().join("out.bin"),
            &TransferOptions::default(),
            &mut NullObserver,
        )
        .unwrap_err();

        assert!(matches!(err, TransferError::Io(_)));
        assert!(!dir.path().join("out.bin").exists());
        Ok(())
    }

    #[test]
    fn test_small_chunk_size() {
        let data = image(37);
        let mut ecu = SimEcu::with_seed(8);
        ecu.load_region(0x4000_0000, &data);
        let (mut client, _) = open_sim(ecu);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ram.bin");
        let opts = TransferOptions {
            chunk_size: 16,
            ..Default::default()
        };
        download(&mut client, 0x4000_0000, 37, &dest, &opts, &mut NullObserver).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), data);
    }
}
