use crate::mapper::ReactiveMapper;
use anyhow::{Context, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer as _, Producer as _, Split as _};
use rustfft::FftPlanner;
use rustfft::num_complex::Complex;
use std::f32::consts::PI;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Number of Bark bands in the specific-loudness vector, matching the
/// analyzer the original performance patch listened to.
pub const NUM_BARK_BANDS: usize = 24;

pub fn list_input_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    let devices = host.input_devices().context("enumerate input devices")?;

    let mut out = io::stdout();
    writeln!(out, "Input devices:")?;
    for dev in devices {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        writeln!(out, "  - {}", name)?;
    }
    Ok(())
}

/// Owns the input stream and the analyzer thread that turns raw samples into
/// loudness feature frames pushed into the mapper.
pub struct AudioSystem {
    _stream: cpal::Stream,
    stop: Arc<AtomicBool>,
    analyzer_handle: Option<thread::JoinHandle<()>>,
    pub sample_rate_hz: u32,
}

impl AudioSystem {
    pub fn new(device_query: Option<&str>, mapper: Arc<ReactiveMapper>) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = select_input_device(&host, device_query)?;
        let supported = device
            .default_input_config()
            .context("get default input config")?;
        let sample_rate_hz = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.clone().into();

        let rb_capacity = (sample_rate_hz as usize).saturating_mul(4);
        let rb = HeapRb::<f32>::new(rb_capacity);
        let (mut prod, mut cons) = rb.split();

        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);

        let err_fn = |err| eprintln!("audio stream error: {err}");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            fmt => return Err(anyhow!("unsupported sample format: {fmt:?}")),
        };

        stream.play().context("start input stream")?;

        let analyzer_handle = thread::spawn(move || {
            analyze_loop(&mut cons, sample_rate_hz, &stop_for_thread, &mapper)
        });

        Ok(Self {
            _stream: stream,
            stop,
            analyzer_handle: Some(analyzer_handle),
            sample_rate_hz,
        })
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.analyzer_handle.take() {
            let _ = h.join();
        }
    }
}

fn select_input_device(
    host: &cpal::Host,
    device_query: Option<&str>,
) -> anyhow::Result<cpal::Device> {
    let devices = host
        .input_devices()
        .context("enumerate input devices")?
        .collect::<Vec<_>>();

    let want = device_query.map(|s| s.to_lowercase());
    if let Some(want) = want.as_deref() {
        if let Some(dev) = devices.iter().find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(want))
                .unwrap_or(false)
        }) {
            return Ok(dev.clone());
        }
        return Err(anyhow!("no input device matching: {want}"));
    }

    host.default_input_device()
        .ok_or_else(|| anyhow!("no default input device found"))
}

fn push_interleaved<T: Sample<Float = f32> + Copy>(
    data: &[T],
    channels: usize,
    prod: &mut ringbuf::HeapProd<f32>,
) {
    for frame in data.chunks(channels) {
        let mut acc = 0.0f32;
        for s in frame {
            acc += (*s).to_float_sample();
        }
        let mono = acc / channels as f32;
        let _ = prod.try_push(mono);
    }
}

fn analyze_loop(
    cons: &mut ringbuf::HeapCons<f32>,
    sample_rate_hz: u32,
    stop: &AtomicBool,
    mapper: &ReactiveMapper,
) {
    // 1024-point windows every 512 samples keep feature latency well under a
    // displayed frame at 44.1/48 kHz.
    let n = 1024usize;
    let hop = 512usize;

    let mut scratch = vec![0.0f32; n];
    let mut write_pos = 0usize;
    let mut filled = 0usize;
    let mut since_last = 0usize;

    let hann = (0..n)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / (n as f32)).cos())
        .collect::<Vec<_>>();

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n);
    let mut fft_buf = vec![Complex { re: 0.0, im: 0.0 }; n];
    let mut mags = vec![0.0f32; n / 2];

    let band_of = bark_band_map(n, sample_rate_hz);
    let mut specific = [0.0f32; NUM_BARK_BANDS];

    while !stop.load(Ordering::Relaxed) {
        let mut got_any = false;
        while let Some(s) = cons.try_pop() {
            got_any = true;
            scratch[write_pos] = s;
            write_pos = (write_pos + 1) % n;
            if filled < n {
                filled += 1;
            }
            since_last += 1;
            if filled == n && since_last >= hop {
                since_last = 0;

                for i in 0..n {
                    fft_buf[i].re = scratch[(write_pos + i) % n] * hann[i];
                    fft_buf[i].im = 0.0;
                }
                fft.process(&mut fft_buf);
                for (i, c) in fft_buf.iter().take(n / 2).enumerate() {
                    mags[i] = (c.re * c.re + c.im * c.im).sqrt();
                }

                let total = specific_loudness(&mags, &band_of, &mut specific);
                mapper.on_feature_frame(&specific, total);
            }
        }

        if !got_any {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Bark value for a frequency in Hz (Zwicker's critical-band scale).
fn bark(f_hz: f32) -> f32 {
    13.0 * (0.00076 * f_hz).atan() + 3.5 * ((f_hz / 7500.0) * (f_hz / 7500.0)).atan()
}

/// Precomputed Bark-band index per FFT bin: bands are equal-width in Bark up
/// to the Nyquist frequency.
fn bark_band_map(n: usize, sample_rate_hz: u32) -> Vec<usize> {
    let sr = sample_rate_hz as f32;
    let nyquist_bark = bark(sr / 2.0).max(1e-6);
    let band_width = nyquist_bark / NUM_BARK_BANDS as f32;
    (0..n / 2)
        .map(|i| {
            let f = (i as f32) * sr / (n as f32);
            ((bark(f) / band_width) as usize).min(NUM_BARK_BANDS - 1)
        })
        .collect()
}

/// Specific loudness per Bark band (amplitude sum compressed by ^0.23, the
/// Stevens-law exponent the original analyzer used) and the total.
fn specific_loudness(mags: &[f32], band_of: &[usize], specific: &mut [f32]) -> f32 {
    let mut acc = [0.0f32; NUM_BARK_BANDS];
    for (i, &m) in mags.iter().enumerate() {
        acc[band_of[i]] += m;
    }
    let mut total = 0.0f32;
    for (dst, a) in specific.iter_mut().zip(acc) {
        *dst = a.powf(0.23);
        total += *dst;
    }
    total
}
