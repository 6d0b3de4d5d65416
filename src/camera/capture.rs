use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// 専用スレッドでキャプチャし続け、常に最新フレームだけを提供するカメラ
///
/// 検出が遅れてもフレームは溜まらない。起動失敗（権限なし等）は
/// ここで即座にエラーとして返り、リトライはしない。
pub struct CameraFeed {
    latest: Arc<Mutex<Option<Mat>>>,
    frame_id: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    width: u32,
    height: u32,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraFeed {
    /// カメラを開いてキャプチャスレッドを開始する
    pub fn start(index: i32, width: u32, height: u32) -> Result<Self> {
        let mut capture = VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)
            .with_context(|| format!("failed to open camera {index}"))?;

        if !capture.is_opened()? {
            anyhow::bail!("camera {index} is not available");
        }

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;

        let latest = Arc::new(Mutex::new(None::<Mat>));
        let frame_id = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let latest_ref = Arc::clone(&latest);
        let frame_id_ref = Arc::clone(&frame_id);
        let running_ref = Arc::clone(&running);

        let handle = thread::spawn(move || {
            while running_ref.load(Ordering::Acquire) {
                let mut frame = Mat::default();
                match capture.read(&mut frame) {
                    Ok(true) if !frame.empty() => {
                        *latest_ref.lock().unwrap() = Some(frame);
                        frame_id_ref.fetch_add(1, Ordering::Release);
                    }
                    _ => {
                        // 一時的な読み取り失敗はスキップ
                        thread::sleep(std::time::Duration::from_millis(5));
                    }
                }
            }
        });

        Ok(Self {
            latest,
            frame_id,
            running,
            width: actual_width,
            height: actual_height,
            handle: Some(handle),
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 新フレームが到着するたびにインクリメントされる ID
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }

    /// 最新フレームのコピーを取得。初回フレーム到着前のみ None
    pub fn get_frame(&self) -> Option<Mat> {
        self.latest.lock().unwrap().as_ref().cloned()
    }

    /// キャプチャスレッドを停止して合流する
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraFeed {
    fn drop(&mut self) {
        self.stop();
    }
}
