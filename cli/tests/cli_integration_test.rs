use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn tmp_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sonicframe-cli-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir.join(name)
}

fn run_sonicframe(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sonicframe"))
        .args(args)
        .output()
        .expect("Failed to execute sonicframe")
}

fn combined_output(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string() + &String::from_utf8_lossy(&output.stdout)
}

fn path_str(path: &PathBuf) -> &str {
    path.to_str().expect("temp path is UTF-8")
}

#[test]
fn test_gen_encode_decode_roundtrip() {
    let bits = tmp_path("roundtrip_bits.txt");
    let audio = tmp_path("roundtrip.wav");
    let decoded = tmp_path("roundtrip_decoded.txt");

    let out = run_sonicframe(&["gen-bits", path_str(&bits), "-n", "64", "--seed", "3"]);
    assert!(out.status.success(), "gen-bits failed: {}", combined_output(&out));

    let out = run_sonicframe(&["encode", path_str(&bits), path_str(&audio)]);
    assert!(out.status.success(), "encode failed: {}", combined_output(&out));

    // Silence + preamble + 72 bits + trailing silence
    let reader = hound::WavReader::open(&audio).expect("WAV not created");
    assert_eq!(reader.spec().bits_per_sample, 16);
    assert_eq!(reader.duration(), 22050 + 440 + 72 * 44 + 4410);

    let out = run_sonicframe(&[
        "decode",
        path_str(&audio),
        path_str(&decoded),
        "--payload-bits",
        "64",
        "--block-size",
        "1000",
    ]);
    assert!(out.status.success(), "decode failed: {}", combined_output(&out));

    let sent = fs::read_to_string(&bits).unwrap();
    let received = fs::read_to_string(&decoded).unwrap();
    assert_eq!(received.trim(), sent.trim());
}

#[test]
fn test_ofdm_roundtrip_to_stdout() {
    let bits = tmp_path("ofdm_bits.txt");
    let audio = tmp_path("ofdm.wav");
    fs::write(&bits, "1011001110001111").unwrap();

    let out = run_sonicframe(&["encode", path_str(&bits), path_str(&audio), "-m", "ofdm"]);
    assert!(out.status.success(), "encode failed: {}", combined_output(&out));

    let out = run_sonicframe(&["decode", path_str(&audio), "-n", "16", "-m", "ofdm"]);
    assert!(out.status.success(), "decode failed: {}", combined_output(&out));
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "1011001110001111");
}

#[test]
fn test_decode_writes_diagnostics() {
    let bits = tmp_path("diag_bits.txt");
    let audio = tmp_path("diag.wav");
    let trace = tmp_path("diag_trace.csv");
    let table = tmp_path("diag_bits.csv");
    let beeps = tmp_path("diag_beeps.wav");
    fs::write(&bits, "11110000").unwrap();

    let out = run_sonicframe(&["encode", path_str(&bits), path_str(&audio)]);
    assert!(out.status.success(), "encode failed: {}", combined_output(&out));

    let out = run_sonicframe(&[
        "decode",
        path_str(&audio),
        "-n",
        "8",
        "--ncc-trace",
        path_str(&trace),
        "--bit-table",
        path_str(&table),
        "--beep-track",
        path_str(&beeps),
    ]);
    assert!(out.status.success(), "decode failed: {}", combined_output(&out));

    let trace_text = fs::read_to_string(&trace).unwrap();
    assert!(trace_text.starts_with("sample,score\n"));
    assert!(trace_text.lines().count() > 20_000);

    let table_text = fs::read_to_string(&table).unwrap();
    assert_eq!(table_text.lines().count(), 1 + 16);

    assert_eq!(
        fs::metadata(&beeps).unwrap().len(),
        fs::metadata(&audio).unwrap().len()
    );
}

#[test]
fn test_decode_silence_fails() {
    let audio = tmp_path("silence.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&audio, spec).unwrap();
    for _ in 0..44100 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();

    let out = run_sonicframe(&["decode", path_str(&audio)]);
    assert!(!out.status.success(), "decoding silence should fail");
    assert!(
        combined_output(&out).contains("no frame was accepted"),
        "unexpected output: {}",
        combined_output(&out)
    );
}

#[test]
fn test_sample_rate_mismatch_is_reported() {
    let audio = tmp_path("rate.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 48000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&audio, spec).unwrap();
    writer.write_sample(0i16).unwrap();
    writer.finalize().unwrap();

    let out = run_sonicframe(&["decode", path_str(&audio)]);
    assert!(!out.status.success());
    assert!(combined_output(&out).contains("48000"));
}

#[test]
fn test_loopback_with_noise() {
    let out = run_sonicframe(&["loopback", "-n", "200", "--noise", "0.02", "--seed", "5"]);
    assert!(out.status.success(), "loopback failed: {}", combined_output(&out));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("0 bit errors"), "unexpected output: {}", stdout);
}

#[test]
fn test_trace_command_peaks_at_preamble() {
    let bits = tmp_path("trace_bits.txt");
    let audio = tmp_path("trace.wav");
    let csv = tmp_path("trace.csv");
    fs::write(&bits, "0101").unwrap();

    let out = run_sonicframe(&["encode", path_str(&bits), path_str(&audio)]);
    assert!(out.status.success(), "encode failed: {}", combined_output(&out));

    let out = run_sonicframe(&["trace", path_str(&audio), path_str(&csv)]);
    assert!(out.status.success(), "trace failed: {}", combined_output(&out));

    let text = fs::read_to_string(&csv).unwrap();
    let (peak_index, peak) = text
        .lines()
        .skip(1)
        .filter_map(|line| {
            let (index, score) = line.split_once(',')?;
            Some((index.parse::<usize>().ok()?, score.parse::<f32>().ok()?))
        })
        .fold((0, f32::MIN), |best, row| if row.1 > best.1 { row } else { best });
    assert_eq!(peak_index, 22050);
    assert!(peak > 0.99, "peak {}", peak);
}

#[test]
fn test_trace_command_follows_scoring_method() {
    let bits = tmp_path("dot_trace_bits.txt");
    let audio = tmp_path("dot_trace.wav");
    let csv = tmp_path("dot_trace.csv");
    fs::write(&bits, "0101").unwrap();

    let out = run_sonicframe(&["encode", path_str(&bits), path_str(&audio)]);
    assert!(out.status.success(), "encode failed: {}", combined_output(&out));

    let out = run_sonicframe(&[
        "trace",
        path_str(&audio),
        path_str(&csv),
        "--scoring",
        "dot-product",
    ]);
    assert!(out.status.success(), "trace failed: {}", combined_output(&out));

    // The preamble is written at half the data amplitude and the frame peaks at 0.9,
    // so an unnormalized score at the preamble reads about 0.45 instead of 1.0
    let text = fs::read_to_string(&csv).unwrap();
    let score = text
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(','))
        .find(|(index, _)| *index == "22050")
        .and_then(|(_, score)| score.parse::<f32>().ok())
        .expect("trace row for the preamble start");
    assert!(score > 0.4 && score < 0.5, "score {}", score);
}

#[test]
fn test_invalid_arguments_are_rejected() {
    let out = run_sonicframe(&["gen-bits", path_str(&tmp_path("bad.txt")), "-p", "pattern:12"]);
    assert!(!out.status.success());

    let out = run_sonicframe(&["loopback", "--detector", "psk"]);
    assert!(!out.status.success());
}
