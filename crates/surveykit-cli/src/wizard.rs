use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input};
use serde::{Deserialize, Serialize};
use surveykit_db::{NewAerotherme, NewClimateUnit, NewGtbModule, NewLightingZone, SurveyStore};
use tracing::info;

/// Everything the wizard has collected so far. Written to disk after every
/// step so an interrupted entry session can be resumed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveyDraft {
    pub site_name: Option<String>,
    pub address: Option<String>,
    pub client: Option<String>,
    pub aerothermes: Vec<NewAerotherme>,
    pub climate_units: Vec<NewClimateUnit>,
    pub lighting_zones: Vec<NewLightingZone>,
    pub gtb_modules: Vec<NewGtbModule>,
}

pub fn default_draft_path(db_path: &Path) -> PathBuf {
    db_path.with_extension("draft.json")
}

pub fn load_draft(path: &Path) -> Result<Option<SurveyDraft>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read draft {}", path.display()))?;
    let draft = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse draft {}", path.display()))?;
    Ok(Some(draft))
}

pub fn save_draft(path: &Path, draft: &SurveyDraft) -> Result<()> {
    let json = serde_json::to_string_pretty(draft)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write draft {}", path.display()))?;
    Ok(())
}

/// Run the interactive survey entry wizard against `store`, persisting a
/// draft to `draft_path` between steps.
pub fn run_wizard(store: &SurveyStore, draft_path: &Path) -> Result<()> {
    if !std::io::stdin().is_terminal() {
        println!("Non-interactive environment detected.");
        println!("Use `surveykit sites add <name>` to record sites from scripts.");
        return Ok(());
    }

    println!();
    println!("  SurveyKit Survey Entry");
    println!("  ----------------------");
    println!();

    let mut draft = SurveyDraft::default();
    if let Some(found) = load_draft(draft_path)? {
        let resume = Confirm::new()
            .with_prompt(format!(
                "Found a draft for '{}'. Resume it?",
                found.site_name.as_deref().unwrap_or("unnamed site")
            ))
            .default(true)
            .interact()
            .context("draft prompt cancelled")?;
        if resume {
            draft = found;
        }
    }

    // --- Site info ---
    let name: String = Input::new()
        .with_prompt("Site name")
        .with_initial_text(draft.site_name.clone().unwrap_or_default())
        .interact_text()
        .context("site name input cancelled")?;
    draft.site_name = Some(name.trim().to_string());

    let address: String = Input::new()
        .with_prompt("Address (optional)")
        .with_initial_text(draft.address.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()
        .context("address input cancelled")?;
    draft.address = non_empty(address);

    let client: String = Input::new()
        .with_prompt("Client (optional)")
        .with_initial_text(draft.client.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()
        .context("client input cancelled")?;
    draft.client = non_empty(client);
    save_draft(draft_path, &draft)?;

    // --- Equipment loops ---
    while confirm(&format!(
        "Add an aerotherme? ({} so far)",
        draft.aerothermes.len()
    ))? {
        let brand = optional_input("Brand")?;
        let model = optional_input("Model")?;
        let power_kw = optional_number("Power (kW)")?;
        let fuel = optional_input("Fuel (gas/fuel oil/electric)")?;
        draft.aerothermes.push(NewAerotherme {
            brand,
            model,
            power_kw,
            fuel,
            location: optional_input("Location in building")?,
        });
        save_draft(draft_path, &draft)?;
    }

    while confirm(&format!(
        "Add a climate unit? ({} so far)",
        draft.climate_units.len()
    ))? {
        let unit_type = optional_input("Unit type (split/rooftop/VRV)")?;
        let refrigerant = optional_input("Refrigerant")?;
        let cooling_kw = optional_number("Cooling power (kW)")?;
        draft.climate_units.push(NewClimateUnit {
            unit_type,
            refrigerant,
            cooling_kw,
            ..Default::default()
        });
        save_draft(draft_path, &draft)?;
    }

    while confirm(&format!(
        "Add a lighting zone? ({} so far)",
        draft.lighting_zones.len()
    ))? {
        let zone: String = Input::new()
            .with_prompt("Zone name")
            .interact_text()
            .context("zone input cancelled")?;
        let fixture_count: u32 = Input::new()
            .with_prompt("Fixture count")
            .default(0)
            .interact_text()
            .context("fixture count input cancelled")?;
        draft.lighting_zones.push(NewLightingZone {
            zone,
            fixture_count,
            ..Default::default()
        });
        save_draft(draft_path, &draft)?;
    }

    while confirm(&format!(
        "Add a GTB module? ({} so far)",
        draft.gtb_modules.len()
    ))? {
        let name: String = Input::new()
            .with_prompt("Module name")
            .interact_text()
            .context("module name input cancelled")?;
        let protocol = optional_input("Protocol (bacnet/modbus/knx)")?;
        draft.gtb_modules.push(NewGtbModule {
            name,
            protocol,
            ..Default::default()
        });
        save_draft(draft_path, &draft)?;
    }

    // --- Submit ---
    if !confirm("Save this survey to the database?")? {
        println!("  Draft kept at {}", draft_path.display());
        return Ok(());
    }

    let site_id = submit_draft(store, &draft)?;
    std::fs::remove_file(draft_path).ok();

    info!("survey for site {site_id} saved");
    println!();
    println!("  Survey saved. Site id: {site_id}");
    println!("  Run `surveykit sites list` to see it.");
    println!();

    Ok(())
}

/// Write a completed draft through the store as one site plus its equipment.
pub fn submit_draft(store: &SurveyStore, draft: &SurveyDraft) -> Result<String> {
    let name = draft
        .site_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .context("draft has no site name")?;

    let site_id = store.create_site(name, draft.address.as_deref(), draft.client.as_deref())?;
    for unit in &draft.aerothermes {
        store.add_aerotherme(&site_id, unit)?;
    }
    for unit in &draft.climate_units {
        store.add_climate_unit(&site_id, unit)?;
    }
    for zone in &draft.lighting_zones {
        store.add_lighting_zone(&site_id, zone)?;
    }
    for module in &draft.gtb_modules {
        store.add_gtb_module(&site_id, module)?;
    }
    store.mark_surveyed(&site_id)?;
    Ok(site_id)
}

fn confirm(prompt: &str) -> Result<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("prompt cancelled")
}

fn optional_input(prompt: &str) -> Result<Option<String>> {
    let value: String = Input::new()
        .with_prompt(format!("{prompt} (optional)"))
        .allow_empty(true)
        .interact_text()
        .context("input cancelled")?;
    Ok(non_empty(value))
}

fn optional_number(prompt: &str) -> Result<Option<f64>> {
    let value: String = Input::new()
        .with_prompt(format!("{prompt} (optional)"))
        .allow_empty(true)
        .interact_text()
        .context("input cancelled")?;
    match non_empty(value) {
        None => Ok(None),
        Some(s) => Ok(Some(
            s.parse().with_context(|| format!("'{s}' is not a number"))?,
        )),
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_draft() -> SurveyDraft {
        SurveyDraft {
            site_name: Some("Entrepot Lyon Sud".into()),
            address: Some("12 rue des Freres".into()),
            client: None,
            aerothermes: vec![NewAerotherme {
                brand: Some("Sovelor".into()),
                power_kw: Some(30.0),
                ..Default::default()
            }],
            climate_units: vec![],
            lighting_zones: vec![NewLightingZone {
                zone: "atelier".into(),
                fixture_count: 24,
                ..Default::default()
            }],
            gtb_modules: vec![NewGtbModule {
                name: "GTB-entree".into(),
                protocol: Some("bacnet".into()),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn draft_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.draft.json");

        let draft = sample_draft();
        save_draft(&path, &draft).unwrap();

        let loaded = load_draft(&path).unwrap().unwrap();
        assert_eq!(loaded.site_name.as_deref(), Some("Entrepot Lyon Sud"));
        assert_eq!(loaded.aerothermes.len(), 1);
        assert_eq!(loaded.lighting_zones[0].fixture_count, 24);
    }

    #[test]
    fn load_missing_draft_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-draft.json");
        assert!(load_draft(&path).unwrap().is_none());
    }

    #[test]
    fn submit_draft_writes_all_rows() {
        let store = SurveyStore::in_memory().unwrap();
        let site_id = submit_draft(&store, &sample_draft()).unwrap();

        let site = store.get_site(&site_id).unwrap().unwrap();
        assert_eq!(site.name, "Entrepot Lyon Sud");
        assert!(site.surveyed_at.is_some());
        assert_eq!(store.equipment_counts(&site_id).unwrap(), (1, 0, 1, 1));
    }

    #[test]
    fn submit_draft_without_name_fails() {
        let store = SurveyStore::in_memory().unwrap();
        let err = submit_draft(&store, &SurveyDraft::default()).unwrap_err();
        assert!(err.to_string().contains("no site name"));
    }

    #[test]
    fn draft_path_sits_next_to_the_database() {
        let path = default_draft_path(Path::new("/data/surveykit.db"));
        assert_eq!(path, Path::new("/data/surveykit.draft.json"));
    }
}
