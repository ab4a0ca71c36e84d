use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::trace;

use super::dates::strip_stem_date;
use super::metadata::Metadata;
use super::xml::{read_mgl_fields, read_mra_fields};
use super::{TagDictionary, TagId};
use crate::error::{Error, Result};

/// Alias groups every run starts from, after the ones coming from metadata.
pub const DEFAULT_ALIASES: &[&[&str]] = &[
    // Consoles
    &["nes", "famicom", "nintendo"],
    &["snes", "sufami", "supernes", "supernintendo", "superfamicom"],
    &["pcengine", "tgfx16", "turbografx16", "turbografx"],
    &["pcenginecd", "tgfx16cd", "turbografx16cd", "turbografxcd"],
    &["megadrive", "genesis"],
    &["megacd", "segacd"],
    &["sms", "mastersystem", "segamark3"],
    &["gb", "gameboy"],
    &["gbc", "gameboycolor"],
    &["sgb", "supergameboy"],
    &["gba", "gameboyadvance"],
    // General
    &["console-cores", "console"],
    &["arcade-cores", "arcade"],
    &["computer-cores", "computer"],
    &["other-cores", "other"],
    &["service-cores", "utility"],
];

const CORE_CATEGORIES: &[&str] = &["console", "computer", "other", "arcade"];
const CORE_FOLDER_CATEGORIES: &[&str] = &["console", "computer", "other", "utility"];
const UTILITY_CATEGORY: &str = "utility";
const HOME_FOLDERS: &[&str] = &["games", "docs"];
const FILTER_FOLDERS: &[&str] = &["gamma", "filters", "filters_audio", "shadow_masks"];
const VIDEO_FILTER_FOLDERS: &[&str] = &["gamma", "filters", "shadow_masks"];
const HANDHELD_2P: &[&str] = &["gba2p", "gameboy2p"];
const ESSENTIAL_STEMS: &[&str] = &["menu", "mister"];

/// Ordered, duplicate-free accumulation of tag ids.
#[derive(Default)]
struct TagSet(Vec<TagId>);

impl TagSet {
    fn push(&mut self, id: TagId) {
        if !self.0.contains(&id) {
            self.0.push(id);
        }
    }

    fn into_sorted(mut self) -> Vec<TagId> {
        self.0.sort();
        self.0
    }
}

/// Infers tags from a path's shape and, for `.mra`/`.mgl`, a couple of
/// embedded fields.
///
/// All files must be tagged before any folder: `arcade/_alternatives/<core>`
/// folders are tagged from the MRA files found inside them.
pub struct TagEngine {
    root: PathBuf,
    dictionary: TagDictionary,
    metadata: Metadata,
    alternatives: BTreeMap<String, BTreeSet<String>>,
    aliases_initialised: bool,
}

impl TagEngine {
    /// `root` is where embedded fields are read from; tagged paths are relative to it.
    pub fn new(root: &Path, metadata: Metadata) -> Self {
        Self {
            root: root.to_path_buf(),
            dictionary: TagDictionary::new(),
            metadata,
            alternatives: BTreeMap::new(),
            aliases_initialised: false,
        }
    }

    /// Registers the metadata alias groups followed by `groups`. Only once per engine.
    pub fn init_aliases<G, S>(&mut self, groups: &[G]) -> Result<()>
    where
        G: AsRef<[S]>,
        S: AsRef<str>,
    {
        if self.aliases_initialised {
            return Err(Error::InvalidConfig(
                "Tag aliases can only be initialised once".to_string(),
            ));
        }
        self.aliases_initialised = true;

        let from_metadata = self.metadata.aliases().to_vec();
        for group in &from_metadata {
            self.dictionary.merge_aliases(group)?;
        }
        for group in groups {
            self.dictionary.merge_aliases(group.as_ref())?;
        }
        Ok(())
    }

    pub fn tags_for_file(&mut self, path: &str) -> Result<Vec<TagId>> {
        let parts = segments(path);
        let Some(first) = parts.first() else {
            return Ok(Vec::new());
        };
        let top = top_segment(first);
        let mut tags = TagSet::default();

        if parts.len() > 1 {
            self.term(&mut tags, &top)?;
        }
        self.add_cores_terms(&mut tags, &top)?;

        let file = Path::new(parts[parts.len() - 1]);
        let extension = lowercase_os(file.extension());
        let stem = lowercase_os(file.file_stem());

        match extension.as_str() {
            "mra" => self.tag_mra(&mut tags, path, &parts)?,
            "rbf" => self.tag_rbf(&mut tags, &top, &stem)?,
            "mgl" => self.tag_mgl(&mut tags, path, &stem)?,
            _ => {}
        }

        if ESSENTIAL_STEMS.contains(&stem.as_str()) {
            self.term(&mut tags, "essential")?;
        }

        if HOME_FOLDERS.contains(&top.as_str()) && parts.len() > 1 {
            self.tag_home_file(&mut tags, &top, &parts, &stem, &extension)?;
        } else if top == "cheats" && parts.len() > 1 {
            self.term(&mut tags, &parts[1].to_lowercase())?;
            self.term(&mut tags, "console")?;
        } else if FILTER_FOLDERS.contains(&top.as_str()) {
            self.term(&mut tags, "all_filters")?;
            if VIDEO_FILTER_FOLDERS.contains(&top.as_str()) {
                self.term(&mut tags, "filters_video")?;
            }
        }

        trace!("Tags for file {}: {:?}", path, tags.0);
        Ok(tags.into_sorted())
    }

    pub fn tags_for_folder(&mut self, path: &str) -> Result<Vec<TagId>> {
        let parts = segments(path);
        let Some(first) = parts.first() else {
            return Ok(Vec::new());
        };
        let top = top_segment(first);
        let mut tags = TagSet::default();

        self.term(&mut tags, &top)?;
        if CORE_FOLDER_CATEGORIES.contains(&top.as_str()) {
            self.term(&mut tags, "cores")?;
        } else if top == "cheats" {
            self.term(&mut tags, "console")?;
        }
        self.add_cores_terms(&mut tags, &top)?;

        if parts.len() == 1 {
            return Ok(tags.into_sorted());
        }

        let first_level = strip_underscore(&parts[1].to_lowercase()).to_string();
        if HOME_FOLDERS.contains(&top.as_str()) {
            self.tag_home(&mut tags, &first_level)?;
        }
        self.term(&mut tags, &first_level)?;

        if parts.len() == 2 {
            return Ok(tags.into_sorted());
        }

        let second_level = strip_underscore(&parts[2].to_lowercase()).to_string();
        if top == "arcade" && first_level == "alternatives" {
            let rbfs = self
                .alternatives
                .get(&second_level)
                .cloned()
                .unwrap_or_default();
            for rbf in rbfs.iter().filter(|rbf| !rbf.is_empty()) {
                self.arcade_term(&mut tags, rbf)?;
            }
        }

        if top == "games" {
            if second_level == "palettes" {
                self.term(&mut tags, &second_level)?;
            } else {
                self.term(&mut tags, "extra-utilities")?;
            }
        }

        Ok(tags.into_sorted())
    }

    /// Published `{term: id}`, restricted to ids some file or folder uses.
    pub fn dictionary(&self) -> BTreeMap<String, TagId> {
        self.dictionary.dictionary()
    }

    /// Sorted human-readable terms, restricted like [`TagEngine::dictionary`].
    pub fn report_terms(&self) -> Vec<String> {
        self.dictionary.report_terms()
    }

    pub fn id_of(&self, raw: &str) -> Option<TagId> {
        self.dictionary.get(raw)
    }

    fn tag_mra(&mut self, tags: &mut TagSet, path: &str, parts: &[&str]) -> Result<()> {
        self.term(tags, "mra")?;
        let fields = read_mra_fields(&self.root.join(path))?;

        if let Some(rbf) = &fields.rbf {
            self.arcade_term(tags, rbf)?;
        }

        if fields.zips.iter().any(|zip| zip.contains("hbmame")) {
            self.term(tags, "hbmame")?;
        }

        if parts.len() > 1 && parts[1].to_lowercase() == "_alternatives" {
            self.term(tags, "alternatives")?;

            if let (Some(rbf), true) = (fields.rbf, parts.len() > 3) {
                let subfolder = strip_underscore(&parts[2].to_lowercase()).to_string();
                self.alternatives.entry(subfolder).or_default().insert(rbf);
            }
        }
        Ok(())
    }

    fn tag_rbf(&mut self, tags: &mut TagSet, top: &str, stem: &str) -> Result<()> {
        let nodates = strip_stem_date(stem);
        self.term(tags, "cores")?;
        if top == "arcade" || nodates.starts_with("arcade-") {
            self.arcade_term(tags, nodates)?;
        } else {
            self.term(tags, nodates)?;
        }
        if HANDHELD_2P.contains(&nodates) {
            self.term(tags, "handheld2p")?;
        }
        Ok(())
    }

    fn tag_mgl(&mut self, tags: &mut TagSet, path: &str, stem: &str) -> Result<()> {
        self.term(tags, "mgl")?;
        self.term(tags, "cores")?;
        self.term(tags, stem)?;
        let fields = read_mgl_fields(&self.root.join(path))?;
        if let Some(rbf) = fields.rbf {
            let name = rbf.trim_end_matches('/').rsplit('/').next().unwrap_or(&rbf);
            self.term(tags, &name.to_lowercase())?;
        }
        Ok(())
    }

    fn tag_home_file(
        &mut self,
        tags: &mut TagSet,
        top: &str,
        parts: &[&str],
        stem: &str,
        extension: &str,
    ) -> Result<()> {
        let first_level = parts[1].to_lowercase();
        self.term(tags, &first_level)?;
        self.tag_home(tags, &first_level)?;

        if parts.len() > 2 {
            let second_level = parts[2].to_lowercase();
            if parts.len() > 3 {
                self.term(tags, &second_level)?;
            }
            if top == "games" {
                if second_level.ends_with(".rom") {
                    self.term(tags, "bios")?;
                } else if second_level != "palettes" && extension != "rbf" && extension != "mra" {
                    self.term(tags, "extra-utilities")?;
                }
            }
        }

        if top == "docs" && stem.contains("readme") {
            self.term(tags, "readme")?;
        }
        Ok(())
    }

    /// MGL dependency, category and two-player handheld facts of a home folder.
    fn tag_home(&mut self, tags: &mut TagSet, home: &str) -> Result<()> {
        if let Some(dependency) = self.metadata.mgl_dependency(home).map(str::to_string) {
            self.term(tags, "mgl")?;
            self.term(tags, &dependency)?;
        }
        if let Some(category) = self.metadata.category_by_home(home).map(str::to_string) {
            self.term(tags, &category)?;
        }
        if HANDHELD_2P.contains(&home) {
            self.term(tags, "handheld2p")?;
        }
        Ok(())
    }

    fn add_cores_terms(&mut self, tags: &mut TagSet, top: &str) -> Result<()> {
        if CORE_CATEGORIES.contains(&top) {
            self.term(tags, &format!("{}-cores", top))?;
        } else if top == UTILITY_CATEGORY {
            self.term(tags, "service-cores")?;
        }
        Ok(())
    }

    fn arcade_term(&mut self, tags: &mut TagSet, name: &str) -> Result<()> {
        self.term(tags, &format!("arcade-{}", name))
    }

    fn term(&mut self, tags: &mut TagSet, raw: &str) -> Result<()> {
        tags.push(self.dictionary.use_term(raw)?);
        Ok(())
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect()
}

/// Lowercased first segment without the `|` sigil or a leading `_`.
fn top_segment(first: &str) -> String {
    let lower = first.to_lowercase();
    let without_sigil = lower.strip_prefix('|').unwrap_or(&lower);
    strip_underscore(without_sigil).to_string()
}

fn strip_underscore(segment: &str) -> &str {
    segment.strip_prefix('_').unwrap_or(segment)
}

fn lowercase_os(value: Option<&std::ffi::OsStr>) -> String {
    value
        .map(|v| v.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::metadata::HomeEntry;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn engine_in(tmp: &TempDir) -> TagEngine {
        let mut engine = TagEngine::new(tmp.path(), Metadata::default());
        engine.init_aliases(DEFAULT_ALIASES).unwrap();
        engine
    }

    fn write(tmp: &TempDir, path: &str, content: &str) {
        let full = tmp.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    fn has(engine: &TagEngine, tags: &[TagId], term: &str) -> bool {
        engine.id_of(term).map_or(false, |id| tags.contains(&id))
    }

    #[test]
    fn test_dated_rbf_under_console() {
        let tmp = tempdir().unwrap();
        let mut engine = engine_in(&tmp);

        let first = engine.tags_for_file("console/NES/cores/NES_20230101.rbf").unwrap();
        let second = engine.tags_for_file("console/NES/cores/NES_20230215.rbf").unwrap();

        assert_eq!(first, second);
        assert!(has(&engine, &first, "console-cores"));
        assert!(has(&engine, &first, "nes"));
        assert!(has(&engine, &first, "cores"));
        assert!(engine.id_of("nes20230101").is_none());
        assert!(first.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_aliased_top_levels_share_tag() {
        let tmp = tempdir().unwrap();
        let mut engine = engine_in(&tmp);

        let famicom = engine.tags_for_file("famicom/foo.rbf").unwrap();
        let nintendo = engine.tags_for_file("nintendo/bar.rbf").unwrap();
        let top = engine.id_of("nes").unwrap();

        assert!(famicom.contains(&top));
        assert!(nintendo.contains(&top));
    }

    #[test]
    fn test_arcade_rbf_and_essentials() {
        let tmp = tempdir().unwrap();
        let mut engine = engine_in(&tmp);

        let arcade = engine.tags_for_file("_Arcade/cores/jt1942_20221120.rbf").unwrap();
        assert!(has(&engine, &arcade, "arcade-jt1942"));
        assert!(has(&engine, &arcade, "arcade-cores"));

        let menu = engine.tags_for_file("menu.rbf").unwrap();
        assert!(has(&engine, &menu, "essential"));
        assert!(has(&engine, &menu, "menu"));

        let mister = engine.tags_for_file("MiSTer").unwrap();
        assert_eq!(mister, vec![engine.id_of("essential").unwrap()]);
    }

    #[test]
    fn test_two_player_handheld() {
        let tmp = tempdir().unwrap();
        let mut engine = engine_in(&tmp);
        let tags = engine.tags_for_file("_Console/GBA2P_20230101.rbf").unwrap();
        assert!(has(&engine, &tags, "handheld2p"));
        assert!(has(&engine, &tags, "gba2p"));
    }

    #[test]
    fn test_mra_tags_and_alternatives_folder() {
        let tmp = tempdir().unwrap();
        write(
            &tmp,
            "arcade/_alternatives/corename/game.mra",
            "<misterromdescription><rbf>coreA</rbf><rom zip=\"game.zip|hbmame/game.zip\"/></misterromdescription>",
        );
        let mut engine = engine_in(&tmp);

        let file = engine
            .tags_for_file("arcade/_alternatives/corename/game.mra")
            .unwrap();
        assert!(has(&engine, &file, "mra"));
        assert!(has(&engine, &file, "arcade-corea"));
        assert!(has(&engine, &file, "hbmame"));
        assert!(has(&engine, &file, "alternatives"));

        let folder = engine.tags_for_folder("arcade/_alternatives/corename").unwrap();
        assert!(has(&engine, &folder, "arcade-corea"));
        assert!(has(&engine, &folder, "arcade-cores"));
        assert!(has(&engine, &folder, "alternatives"));

        let parent = engine.tags_for_folder("arcade/_alternatives").unwrap();
        assert!(!parent.contains(&engine.id_of("arcade-corea").unwrap()));
    }

    #[test]
    fn test_underscored_alternatives_subfolder() {
        let tmp = tempdir().unwrap();
        write(
            &tmp,
            "_Arcade/_alternatives/_Pacman/Pacman (bootleg).mra",
            "<mra><rbf>pacman</rbf></mra>",
        );
        let mut engine = engine_in(&tmp);
        engine
            .tags_for_file("_Arcade/_alternatives/_Pacman/Pacman (bootleg).mra")
            .unwrap();
        let folder = engine.tags_for_folder("_Arcade/_alternatives/_Pacman").unwrap();
        assert!(has(&engine, &folder, "arcade-pacman"));
    }

    #[test]
    fn test_malformed_mra_is_fatal() {
        let tmp = tempdir().unwrap();
        write(&tmp, "_Arcade/broken.mra", "<mra><rbf>x</mra>");
        let mut engine = engine_in(&tmp);
        assert!(matches!(
            engine.tags_for_file("_Arcade/broken.mra"),
            Err(Error::Xml { .. })
        ));
    }

    #[test]
    fn test_mgl_with_metadata_home() {
        let tmp = tempdir().unwrap();
        write(
            &tmp,
            "_Console/GameGear.mgl",
            "<mistergamedescription><rbf>_Console/SMS</rbf></mistergamedescription>",
        );
        let mut home = BTreeMap::new();
        home.insert(
            "gamegear".to_string(),
            HomeEntry {
                mgl_dependency: "sms".to_string(),
                category: "console".to_string(),
            },
        );
        let mut engine = TagEngine::new(tmp.path(), Metadata::new(home, vec![]));
        engine.init_aliases(DEFAULT_ALIASES).unwrap();

        let mgl = engine.tags_for_file("_Console/GameGear.mgl").unwrap();
        assert!(has(&engine, &mgl, "mgl"));
        assert!(has(&engine, &mgl, "gamegear"));
        assert!(has(&engine, &mgl, "sms"));

        let game = engine.tags_for_file("games/GameGear/Sonic.gg").unwrap();
        assert!(has(&engine, &game, "gamegear"));
        assert!(has(&engine, &game, "mgl"));
        assert!(has(&engine, &game, "sms"));
        assert!(has(&engine, &game, "console-cores"));
        assert!(has(&engine, &game, "extra-utilities"));

        let folder = engine.tags_for_folder("games/GameGear").unwrap();
        assert!(has(&engine, &folder, "mgl"));
        assert!(has(&engine, &folder, "games"));
    }

    #[test]
    fn test_games_and_docs_rules() {
        let tmp = tempdir().unwrap();
        let mut engine = engine_in(&tmp);

        let bios = engine.tags_for_file("games/NES/boot.rom").unwrap();
        assert!(has(&engine, &bios, "bios"));
        assert!(has(&engine, &bios, "games"));
        assert!(!has(&engine, &bios, "extra-utilities"));

        let palette = engine.tags_for_file("games/NES/Palettes/Smooth.pal").unwrap();
        assert!(has(&engine, &palette, "palettes"));
        assert!(!has(&engine, &palette, "extra-utilities"));

        let readme = engine.tags_for_file("docs/NES/README.md").unwrap();
        assert!(has(&engine, &readme, "readme"));
        assert!(has(&engine, &readme, "docs"));

        let palettes_folder = engine.tags_for_folder("|games/NES/Palettes").unwrap();
        assert!(has(&engine, &palettes_folder, "palettes"));
        let other_folder = engine.tags_for_folder("games/NES/Extras").unwrap();
        assert!(has(&engine, &other_folder, "extra-utilities"));
    }

    #[test]
    fn test_cheats_and_filters() {
        let tmp = tempdir().unwrap();
        let mut engine = engine_in(&tmp);

        let cheat = engine.tags_for_file("Cheats/NES/game.zip").unwrap();
        assert!(has(&engine, &cheat, "cheats"));
        assert!(has(&engine, &cheat, "console"));

        let audio = engine.tags_for_file("Filters_Audio/lowpass.txt").unwrap();
        assert!(has(&engine, &audio, "all_filters"));
        assert!(!has(&engine, &audio, "filters_video"));

        let gamma = engine.tags_for_file("Gamma/curve.txt").unwrap();
        assert!(has(&engine, &gamma, "filters_video"));
    }

    #[test]
    fn test_utility_folder() {
        let tmp = tempdir().unwrap();
        let mut engine = engine_in(&tmp);
        let folder = engine.tags_for_folder("_Utility").unwrap();
        assert!(has(&engine, &folder, "service-cores"));
        assert!(has(&engine, &folder, "cores"));
    }

    #[test]
    fn test_same_tree_same_dictionary() {
        let tmp = tempdir().unwrap();
        let paths = [
            "_Console/NES_20230101.rbf",
            "_Computer/ao486_20230101.rbf",
            "games/NES/boot.rom",
            "menu.rbf",
        ];

        let run = || {
            let mut engine = engine_in(&tmp);
            for path in paths {
                engine.tags_for_file(path).unwrap();
            }
            engine.dictionary()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_init_aliases_only_once() {
        let tmp = tempdir().unwrap();
        let mut engine = engine_in(&tmp);
        assert!(engine.init_aliases(DEFAULT_ALIASES).is_err());
    }
}
