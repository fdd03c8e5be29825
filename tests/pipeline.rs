#![cfg(unix)]

use std::{sync::Arc, time::Duration};

use m3u_validator::{
    Config, RunReport, Validator, ValidatorError,
    ffprobe::{FfprobeProbe, ProbeCommand},
    reachability::HttpQuickCheck,
    run_log::RunLogger,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

/// Stands in for ffprobe, answering by URL path
const FAKE_PROBE: &str = r#"
case "$1" in
  */tv) echo video; echo audio ;;
  */radio) echo audio; echo "[mpegts @ 0x1] Invalid data found when processing input" >&2; exit 1 ;;
  */slides) echo subtitle ;;
  */broken) echo video; echo "[h264 @ 0x1] error while decoding MB 3 4" >&2; exit 1 ;;
  *) echo "unexpected probe of $1" >&2; exit 1 ;;
esac
"#;

struct Setup {
    dir: TempDir,
    server: MockServer,
}

impl Setup {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("m3u")).unwrap();
        std::fs::write(dir.path().join("probe.sh"), FAKE_PROBE).unwrap();

        let server = MockServer::start().await;
        for live in ["/tv", "/radio", "/slides", "/broken"] {
            Mock::given(method("HEAD"))
                .and(path(live))
                .respond_with(ResponseTemplate::new(200))
                .mount(&server)
                .await;
        }
        Mock::given(method("HEAD"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        Self { dir, server }
    }

    fn url(&self, p: &str) -> String {
        format!("{}{p}", self.server.uri())
    }

    fn playlist(&self, name: &str, channels: &[(&str, &str)]) {
        let mut content = String::from("#EXTM3U\n");
        for (title, p) in channels {
            content.push_str(&format!("#EXTINF:-1 group-title=\"Test\",{title}\n{}\n", self.url(p)));
        }
        std::fs::write(self.dir.path().join("m3u").join(name), content).unwrap();
    }

    fn config(&self) -> Config {
        Config {
            playlist_dir: self.dir.path().join("m3u"),
            output_file: self.dir.path().join("out/cleaned_playlist.m3u"),
            log_file: self.dir.path().join("log/validator.log"),
            probe_command: format!("sh {}", self.dir.path().join("probe.sh").display()),
            parallelism: 2,
            ..Config::default()
        }
    }

    async fn run(&self) -> Result<RunReport, ValidatorError> {
        let config = self.config();
        let quick_check = HttpQuickCheck::new(config.quick_check_timeout).unwrap();
        let probe = FfprobeProbe::new(
            ProbeCommand::parse(&config.probe_command).unwrap(),
            Duration::from_secs(10),
        );
        let log = Arc::new(RunLogger::open(&config.log_file));

        Validator::new(config, Arc::new(quick_check), Arc::new(probe), log)
            .run(CancellationToken::new())
            .await
    }

    fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(relative)).unwrap()
    }

    fn exists(&self, relative: &str) -> bool {
        self.dir.path().join(relative).exists()
    }
}

#[tokio::test]
async fn cleans_a_mixed_playlist() {
    let setup = Setup::new().await;
    setup.playlist(
        "channels.m3u",
        &[
            ("TV", "/tv"),
            ("TV", "/tv"),
            ("Gone", "/gone"),
            ("Radio", "/radio"),
            ("Slides", "/slides"),
            ("Broken", "/broken"),
        ],
    );

    let report = setup.run().await.unwrap();

    assert_eq!(report.stats.total_entries, 6);
    assert_eq!(report.stats.total_duplicates, 1);
    assert_eq!(report.stats.total_accepted, 2);
    assert_eq!(report.stats.total_skipped, 3);
    assert!(!report.interrupted);

    let output = setup.read("out/cleaned_playlist.m3u");
    assert_eq!(
        output,
        format!(
            "#EXTM3U\n#EXTINF:-1,TV\n{}\n#EXTINF:-1,Radio\n{}",
            setup.url("/tv"),
            setup.url("/radio")
        )
    );
    assert_eq!(report.bytes_written, output.len());

    let log = setup.read("log/validator.log");
    assert!(log.contains("Created output directory"));
    assert!(log.contains("Failed quick URL check"));
    assert!(log.contains("Total entries processed: 6"));
    assert!(log.contains("Total skipped streams: 3"));
    assert!(!log.contains("unexpected probe"));
}

#[tokio::test]
async fn unreachable_streams_never_reach_the_probe() {
    let setup = Setup::new().await;
    setup.playlist("gone.m3u", &[("Gone", "/gone")]);

    let report = setup.run().await.unwrap();

    assert_eq!(report.stats.total_skipped, 1);
    let log = setup.read("log/validator.log");
    assert!(log.contains("404"));
    assert!(!log.contains("Failed FFprobe validation"));
}

#[tokio::test]
async fn empty_directory_fails_without_output() {
    let setup = Setup::new().await;

    let err = setup.run().await.unwrap_err();

    assert!(err.is_fatal());
    assert!(!setup.exists("out/cleaned_playlist.m3u"));
    assert!(setup.read("log/validator.log").contains("Error: No M3U files found"));
}

#[tokio::test]
async fn output_is_stable_and_reparsable() {
    let setup = Setup::new().await;
    setup.playlist("a.m3u", &[("Radio", "/radio"), ("TV", "/tv")]);
    setup.playlist("b.m3u", &[("TV", "/tv"), ("Gone", "/gone")]);

    setup.run().await.unwrap();
    let first = setup.read("out/cleaned_playlist.m3u");
    setup.run().await.unwrap();
    assert_eq!(setup.read("out/cleaned_playlist.m3u"), first);

    // Feeding the cleaned playlist back in keeps every entry
    std::fs::remove_file(setup.dir.path().join("m3u/a.m3u")).unwrap();
    std::fs::remove_file(setup.dir.path().join("m3u/b.m3u")).unwrap();
    std::fs::write(setup.dir.path().join("m3u/cleaned.m3u"), &first).unwrap();

    let report = setup.run().await.unwrap();
    assert_eq!(report.stats.total_accepted, 2);
    assert_eq!(setup.read("out/cleaned_playlist.m3u"), first);
}
