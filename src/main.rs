use clap::{builder::RangedU64ValueParser, error::ErrorKind, Args, CommandFactory, Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use nback::{
    app_dirs::AppDirs,
    config::{FilePreferencesStore, PreferencesStore},
    engine::{GameEngine, Session, SessionSummary},
    history::{write_csv, History},
    logging::{init_logging, LogTarget},
    runtime::{CrosstermEventSource, FixedTicker, InputEvent, InputSource, PlayerAction, Runner, Ticker},
    sequence::{MatchPolicy, SequenceGenerator},
    session::{GameType, SessionPhase},
    speech::CaptionSpeech,
    ui::GameView,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

const TICK_RATE_MS: u64 = 50;

/// dual n-back working memory trainer for the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal n-back trainer: remember where the square was and which letter was spoken n steps ago, and press when they repeat."
)]
pub struct Cli {
    /// preferences file (defaults to the platform config directory)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// session history database (defaults to ~/.local/state/nback/history.db)
    #[clap(long, global = true)]
    history: Option<PathBuf>,

    /// increase log verbosity (-v info, -vv debug, -vvv trace)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// play a session (the default)
    Play(PlayArgs),
    /// show or reset stored settings
    Settings {
        #[clap(subcommand)]
        action: SettingsAction,
    },
    /// list completed sessions
    History {
        /// number of sessions to show
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// print as csv
        #[clap(long)]
        csv: bool,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsAction {
    Show,
    Reset,
}

/// Overrides for this session; numeric ones are saved as new defaults.
#[derive(Args, Debug, Clone, Default)]
struct PlayArgs {
    /// which stimuli to present
    #[clap(short = 't', long, value_enum)]
    game_type: Option<GameType>,

    /// how many steps back a match refers to
    #[clap(short = 'n', long, value_parser = RangedU64ValueParser::<usize>::new().range(1..=5))]
    n_back: Option<usize>,

    /// number of stimuli in the session
    #[clap(short = 'e', long, value_parser = RangedU64ValueParser::<usize>::new().range(10..=50))]
    events: Option<usize>,

    /// milliseconds per stimulus
    #[clap(short = 'i', long, value_parser = RangedU64ValueParser::<u64>::new().range(1000..=5000))]
    interval_ms: Option<u64>,

    /// share of positions generated as matches
    #[clap(short = 'm', long, value_parser = RangedU64ValueParser::<u32>::new().range(0..=100))]
    match_percentage: Option<u32>,

    /// side length of the visual grid
    #[clap(short = 'g', long, value_parser = RangedU64ValueParser::<usize>::new().range(3..=5))]
    grid_size: Option<usize>,

    /// number of distinct letters spoken
    #[clap(short = 'l', long, value_parser = RangedU64ValueParser::<usize>::new().range(5..=26))]
    letters: Option<usize>,

    /// seed the sequence generator for a reproducible session
    #[clap(long)]
    seed: Option<u64>,

    /// let non-match positions repeat by chance
    #[clap(long)]
    incidental_matches: bool,
}

impl PlayArgs {
    fn apply(&self, engine: &Session) {
        if let Some(game_type) = self.game_type {
            engine.set_game_type(game_type);
        }
        if let Some(n) = self.n_back {
            engine.set_n_back(n);
        }
        if let Some(events) = self.events {
            engine.set_number_of_events(events);
        }
        if let Some(ms) = self.interval_ms {
            engine.set_event_interval(Duration::from_millis(ms));
        }
        if let Some(pct) = self.match_percentage {
            engine.set_match_percentage(pct);
        }
        if let Some(grid) = self.grid_size {
            engine.set_grid_size(grid);
        }
        if let Some(letters) = self.letters {
            engine.set_number_of_combinations(letters);
        }
        if self.incidental_matches {
            engine.set_match_policy(MatchPolicy::Incidental);
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let store: Arc<dyn PreferencesStore> = Arc::new(match &cli.config {
        Some(path) => FilePreferencesStore::with_path(path),
        None => FilePreferencesStore::new(),
    });

    match cli.command.clone().unwrap_or(Command::Play(PlayArgs::default())) {
        Command::Play(args) => play(&cli, store, &args),
        Command::Settings { action } => {
            init_logging(cli.verbose, LogTarget::Stderr);
            settings(&*store, action, &mut io::stdout())
        }
        Command::History { limit, csv } => {
            init_logging(cli.verbose, LogTarget::Stderr);
            let db = open_history(&cli)?;
            history(&db, limit, csv, &mut io::stdout())
        }
    }
}

fn open_history(cli: &Cli) -> rusqlite::Result<History> {
    match &cli.history {
        Some(path) => History::open(path),
        None => History::open_default(),
    }
}

fn settings(
    store: &dyn PreferencesStore,
    action: SettingsAction,
    out: &mut dyn Write,
) -> Result<(), Box<dyn Error>> {
    if action == SettingsAction::Reset {
        store.reset_settings()?;
    }
    let prefs = store.load()?;
    writeln!(out, "{}", serde_json::to_string_pretty(&prefs)?)?;
    Ok(())
}

fn history(db: &History, limit: usize, csv: bool, out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
    let records = db.recent(limit)?;
    if csv {
        write_csv(out, &records)?;
        return Ok(());
    }
    if records.is_empty() {
        writeln!(out, "no sessions recorded")?;
        return Ok(());
    }
    for r in &records {
        writeln!(
            out,
            "{}  {:<11} {}-back  {:>2} events  {:>2}/{:<2}",
            r.finished_at.format("%Y-%m-%d %H:%M"),
            r.game_type.to_string(),
            r.n_back,
            r.number_of_events,
            r.score,
            r.total_matches
        )?;
    }
    Ok(())
}

fn play(cli: &Cli, store: Arc<dyn PreferencesStore>, args: &PlayArgs) -> Result<(), Box<dyn Error>> {
    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }
    init_logging(cli.verbose, LogTarget::File(AppDirs::log_path()));

    let history = match open_history(cli) {
        Ok(db) => Some(db),
        Err(e) => {
            tracing::warn!("session history unavailable: {e}");
            None
        }
    };

    let speech = Arc::new(CaptionSpeech::new());
    let generator = args.seed.map(SequenceGenerator::seeded).unwrap_or_default();
    let session = Session::with_generator(store, speech.clone(), generator);
    args.apply(&session);

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let result = play_loop(&mut terminal, &session, &speech, history.as_ref(), &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn play_loop<B: Backend, E: InputSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    engine: &dyn GameEngine,
    speech: &CaptionSpeech,
    history: Option<&History>,
    runner: &Runner<E, T>,
) -> Result<(), Box<dyn Error>> {
    let summaries = engine.state().last_summary.subscribe();
    let mut last_summary: Option<SessionSummary> = None;
    engine.start_game()?;

    loop {
        for summary in summaries.drain().into_iter().flatten() {
            if let Some(db) = history {
                if let Err(e) = db.record_summary(&summary) {
                    tracing::warn!("failed to record session: {e}");
                }
            }
            last_summary = Some(summary);
        }

        let snapshot = engine.state().snapshot();
        let caption = snapshot
            .game_state
            .audio_value
            .and(speech.last())
            .and_then(|(_, text)| text.chars().next());
        let view = GameView::new(&snapshot)
            .with_caption(caption)
            .with_summary(last_summary.as_ref());
        terminal.draw(|f| f.render_widget(&view, f.area()))?;

        let InputEvent::Key(key) = runner.step() else {
            continue;
        };
        match PlayerAction::from_key(&key) {
            Some(PlayerAction::AudioMatch) => {
                engine.check_audio_match();
            }
            Some(PlayerAction::VisualMatch) => {
                engine.check_visual_match();
            }
            Some(PlayerAction::Replay)
                if snapshot.is_game_over || snapshot.phase == SessionPhase::Idle =>
            {
                speech.clear();
                last_summary = None;
                engine.start_game()?;
            }
            Some(PlayerAction::Quit) => {
                engine.reset_game();
                return Ok(());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use nback::config::{MemoryPreferencesStore, Preferences};
    use nback::runtime::TestEventSource;
    use nback::stub::{EngineCommand, StubEngine};
    use ratatui::backend::TestBackend;
    use std::sync::mpsc;

    fn key(c: char) -> InputEvent {
        InputEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
    }

    fn runner(events: Vec<InputEvent>) -> Runner<TestEventSource, FixedTicker> {
        let (tx, rx) = mpsc::channel();
        for ev in events {
            tx.send(ev).unwrap();
        }
        Runner::new(TestEventSource::new(rx), FixedTicker::new(Duration::from_millis(1)))
    }

    #[test]
    fn test_cli_defaults_to_play() {
        let cli = Cli::parse_from(["nback"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_play_options() {
        let cli = Cli::parse_from([
            "nback", "-vv", "play", "-t", "audio-visual", "-n", "3", "--events", "30",
            "--interval-ms", "1500", "--seed", "7", "--incidental-matches",
        ]);
        assert_eq!(cli.verbose, 2);
        let Some(Command::Play(args)) = cli.command else {
            panic!("expected play");
        };
        assert_eq!(args.game_type, Some(GameType::AudioVisual));
        assert_eq!(args.n_back, Some(3));
        assert_eq!(args.events, Some(30));
        assert_eq!(args.interval_ms, Some(1500));
        assert_eq!(args.seed, Some(7));
        assert!(args.incidental_matches);
    }

    #[test]
    fn test_cli_rejects_out_of_range() {
        assert!(Cli::try_parse_from(["nback", "play", "-n", "0"]).is_err());
        assert!(Cli::try_parse_from(["nback", "play", "--grid-size", "6"]).is_err());
        assert!(Cli::try_parse_from(["nback", "play", "--letters", "27"]).is_err());
        assert!(Cli::try_parse_from(["nback", "play", "--match-percentage", "101"]).is_err());
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["nback", "history", "--csv", "--history", "h.db", "-n", "3"]);
        assert_eq!(cli.history, Some(PathBuf::from("h.db")));
        assert!(matches!(cli.command, Some(Command::History { limit: 3, csv: true })));
    }

    #[test]
    fn test_play_args_apply() {
        let prefs = Arc::new(MemoryPreferencesStore::default());
        let session = Session::new(prefs.clone(), Arc::new(CaptionSpeech::new()));
        PlayArgs {
            game_type: Some(GameType::Audio),
            n_back: Some(4),
            letters: Some(8),
            match_percentage: Some(50),
            ..PlayArgs::default()
        }
        .apply(&session);

        let config = session.state().game_state.get().config;
        assert_eq!(config.game_type, GameType::Audio);
        assert_eq!(config.n_back, 4);
        assert_eq!(config.letter_count, 8);
        assert_eq!(config.match_percentage, 50);
        assert_eq!(prefs.load().unwrap().n_back, 4);
    }

    #[test]
    fn test_settings_show_and_reset() {
        let store = MemoryPreferencesStore::new(Preferences {
            highscore: 5,
            n_back: 4,
            ..Preferences::default()
        });
        let mut out = Vec::new();
        settings(&store, SettingsAction::Show, &mut out).unwrap();
        assert!(String::from_utf8_lossy(&out).contains("\"n_back\": 4"));

        let mut out = Vec::new();
        settings(&store, SettingsAction::Reset, &mut out).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("\"n_back\": 2"));
        assert!(text.contains("\"highscore\": 5"));
    }

    #[test]
    fn test_history_listing() {
        let db = History::in_memory().unwrap();
        let mut out = Vec::new();
        history(&db, 10, false, &mut out).unwrap();
        assert_eq!(String::from_utf8_lossy(&out).trim(), "no sessions recorded");

        db.record_summary(&SessionSummary {
            game_type: GameType::Visual,
            n_back: 2,
            number_of_events: 20,
            score: 5,
            total_matches: 6,
            new_highscore: true,
            finished_at: Local::now(),
        })
        .unwrap();
        let mut out = Vec::new();
        history(&db, 10, false, &mut out).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("Visual"));
        assert!(text.contains("2-back"));
        assert!(text.contains("5/6"));
    }

    #[test]
    fn test_play_loop_forwards_keys_and_quits() {
        let stub = StubEngine::new();
        let speech = CaptionSpeech::new();
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let runner = runner(vec![key('l'), key('a'), InputEvent::Resize, key('q')]);

        play_loop(&mut terminal, &stub, &speech, None, &runner).unwrap();

        assert_eq!(
            stub.commands(),
            vec![
                EngineCommand::StartGame,
                EngineCommand::CheckVisualMatch,
                EngineCommand::CheckAudioMatch,
                EngineCommand::ResetGame,
            ]
        );
    }

    #[test]
    fn test_play_loop_replay_only_after_game_over() {
        let stub = StubEngine::new();
        let speech = CaptionSpeech::new();
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let runner = runner(vec![key('r'), key('q')]);
        play_loop(&mut terminal, &stub, &speech, None, &runner).unwrap();
        assert_eq!(
            stub.commands(),
            vec![EngineCommand::StartGame, EngineCommand::ResetGame]
        );

        let stub = StubEngine::new();
        stub.state().is_game_over.set(true);
        let runner = self::runner(vec![key('r'), key('q')]);
        play_loop(&mut terminal, &stub, &speech, None, &runner).unwrap();
        assert_eq!(
            stub.commands(),
            vec![
                EngineCommand::StartGame,
                EngineCommand::StartGame,
                EngineCommand::ResetGame,
            ]
        );
    }

    #[test]
    fn test_play_loop_records_summaries() {
        let stub = StubEngine::new();
        let summary = SessionSummary {
            game_type: GameType::Visual,
            n_back: 2,
            number_of_events: 20,
            score: 3,
            total_matches: 6,
            new_highscore: false,
            finished_at: Local::now(),
        };
        stub.state().last_summary.set(Some(summary));
        let db = History::in_memory().unwrap();
        let speech = CaptionSpeech::new();
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let runner = runner(vec![key('q')]);

        play_loop(&mut terminal, &stub, &speech, Some(&db), &runner).unwrap();

        let recent = db.recent(5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].score, 3);
    }
}
