/// Interview Simulator - Runs a scripted interview against the in-memory store
///
/// Usage: cargo run --bin interview_sim <fixture.toml>
///
/// The fixture holds the question bank, static packs, engine settings, the
/// scripted AI responses and the candidate's answers in order. Each answer is
/// submitted to whatever item is current at that point.
///
/// With DOSSIER_PROBE_URL set the scripted responses are ignored and every AI
/// call goes to that probe service instead.

use dossier_core::{
    new_entity_id, EngineConfig, FieldProbeResponse, IncidentProbeResponse, InterviewItem,
    PackConfig, QuestionRecord,
};
use dossier_engine::{InterviewEngine, StaticPackTable, SubmitInput};
use dossier_probe::{
    HttpProbeClient, MockSummaryGenerator, ProberRegistry, ScriptedFieldProber,
    ScriptedIncidentProber,
};
use dossier_storage::MockStore;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct SimFixture {
    #[serde(default)]
    engine: EngineConfig,
    questions: Vec<QuestionRecord>,
    #[serde(default)]
    packs: Vec<PackConfig>,
    #[serde(default)]
    field_probes: Vec<FieldProbeResponse>,
    #[serde(default)]
    incident_probes: Vec<IncidentProbeResponse>,
    answers: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dossier_engine=debug,info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: cargo run --bin interview_sim <fixture.toml>");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  cargo run --bin interview_sim dossier-engine/fixtures/sample_interview.toml");
        std::process::exit(1);
    }

    let source = match std::fs::read_to_string(&args[1]) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to read {}: {}", args[1], e);
            std::process::exit(1);
        }
    };
    let fixture: SimFixture = match toml::from_str(&source) {
        Ok(fixture) => fixture,
        Err(e) => {
            eprintln!("Invalid fixture {}: {}", args[1], e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(fixture).await {
        eprintln!("Simulation failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(fixture: SimFixture) -> dossier_core::DossierResult<()> {
    let store = MockStore::with_schema(fixture.questions, Vec::new());

    let probers = if std::env::var("DOSSIER_PROBE_URL").is_ok() {
        let client = HttpProbeClient::from_env()?;
        tracing::info!(client = ?client, "Using probe service");
        ProberRegistry::with_http(client)
    } else {
        scripted_probers(fixture.field_probes, fixture.incident_probes)
    };

    let stall_budget = fixture.engine.watchdog.first_window
        + fixture.engine.watchdog.second_window
        + Duration::from_secs(1);

    let engine = InterviewEngine::builder(Arc::new(store.clone()))
        .config(fixture.engine)
        .probers(probers)
        .static_packs(StaticPackTable::from_packs(fixture.packs))
        .open(new_entity_id())
        .await?;

    for answer in fixture.answers {
        wait_for_prompt(&engine, stall_budget).await?;
        let Some(item) = engine.current_item()? else {
            println!("Interview finished before answer {:?}", answer);
            break;
        };
        let outcome = engine.submit(&item, SubmitInput::answer(answer.clone())).await?;
        println!("[{}] {:?} -> {:?}", item.kind(), answer, outcome);
    }

    println!();
    println!("TRANSCRIPT");
    println!("{}", "-".repeat(60));
    for entry in engine.transcript()? {
        println!("{:<15} {}", format!("{:?}", entry.kind), entry.text);
    }

    let snapshot = engine.snapshot()?;
    println!();
    println!("Status: {:?}", snapshot.status);
    println!("Store writes: {}", store.session_write_count());
    match serde_json::to_string_pretty(&snapshot.current_item) {
        Ok(json) => println!("Current item: {}", json),
        Err(e) => eprintln!("Could not render current item: {}", e),
    }
    Ok(())
}

fn scripted_probers(
    field_probes: Vec<FieldProbeResponse>,
    incident_probes: Vec<IncidentProbeResponse>,
) -> ProberRegistry {
    let mut field = ScriptedFieldProber::new();
    for response in field_probes {
        field = field.then(response);
    }
    let mut incident = ScriptedIncidentProber::new();
    for response in incident_probes {
        incident = incident.then(response);
    }
    let mut probers = ProberRegistry::new();
    probers.register_field(Box::new(field));
    probers.register_incident(Box::new(incident));
    probers.register_summary(Box::new(MockSummaryGenerator::new()));
    probers
}

/// Poll until the engine stops waiting on an AI prompt or `budget` runs out.
async fn wait_for_prompt(engine: &InterviewEngine, budget: Duration) -> dossier_core::DossierResult<()> {
    let deadline = tokio::time::Instant::now() + budget;
    while tokio::time::Instant::now() < deadline {
        match engine.current_item()? {
            Some(InterviewItem::Probing { prompt: None, .. }) => {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            _ => break,
        }
    }
    Ok(())
}
