use nxloc::compression::{DictionarySet, compress, decompress};
use nxloc::config::{BudgetConfig, BuildOptions};
use nxloc::formats::msbt::{self, MsbtBuilder, close_tag, open_tag};
use nxloc::formats::rtbl::{self, CellKey, ColumnKind, TableBuilder, Value};
use nxloc::formats::sarc::{Sarc, SarcWriter};
use nxloc::hash::NameDictionary;
use nxloc::pipeline::{EntryKind, TextKey, Translations, build_archive, extract_archive};
use nxloc::text::tags::TAG_PLACEHOLDER;

const ARCHIVE: &str = "Mals/FRfr.Product.sarc.zs";

fn names() -> NameDictionary {
    ["Item", "Name", "Price"].into_iter().collect()
}

fn archive() -> Vec<u8> {
    let menu = MsbtBuilder::new()
        .message("Title", "Start game", vec![])
        .message("Hint", "\u{E000}Press A\u{E000}", vec![open_tag(0, 3, &[1, 0]), close_tag(0, 3)])
        .message("Greet", "[b]Hello friend[/b]", vec![])
        .build()
        .unwrap();
    let items = rtbl::write(&[TableBuilder::new("Item")
        .column("Name", ColumnKind::String, 16)
        .column("Price", ColumnKind::Int, 4)
        .row(vec![Value::String("Long sword".into()), Value::Int(300)])
        .row(vec![Value::String("Shield".into()), Value::Int(80)])])
    .unwrap();

    let mut writer = SarcWriter::new();
    writer
        .add_file("Message/Menu.msbt", menu)
        .add_file("Table/Item.rtbl", items)
        .add_file("Misc/blob.bin", vec![0, 1, 2, 3])
        .add_file("Message/Broken.msbt", b"MsgStdBn\xFF\xFE".to_vec());
    writer.build()
}

fn translations() -> Translations {
    let mut t = Translations::new();
    t.insert("Message/Menu.msbt", TextKey::Message(0), "Jouer");
    // Both tags were lost by the translator.
    t.insert("Message/Menu.msbt", TextKey::Message(1), "Tape A");
    // Bracket pair turned inside out.
    t.insert("Message/Menu.msbt", TextKey::Message(2), "]b[Salut[/b]");
    t.insert("Table/Item.rtbl", TextKey::Cell(CellKey::new("Item", 0, "Name")), "Epee longue");
    let shield = TextKey::Cell(CellKey::new("Item", 1, "Name"));
    t.insert("Table/Item.rtbl", shield, "Bouclier en chene");
    t.insert("Message/Broken.msbt", TextKey::Message(0), "Rien");
    t
}

fn entry<'a>(sarc: &Sarc, bytes: &'a [u8], name: &str) -> &'a [u8] {
    let file = sarc.get_file_by_name(name).unwrap();
    let (start, end) = sarc.absolute_range(file);
    &bytes[start..end]
}

#[test]
fn extracts_every_text_file() {
    let payload = compress(&archive(), None, 3);
    let dictionaries = DictionarySet::new();
    let extraction =
        extract_archive(&payload, ARCHIVE, &dictionaries, &names(), &BudgetConfig::default())
            .unwrap();

    let messages: Vec<_> = extraction
        .units
        .iter()
        .filter(|u| u.file == "Message/Menu.msbt")
        .collect();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].label.as_deref(), Some("Title"));
    assert_eq!(messages[1].text.matches(TAG_PLACEHOLDER).count(), 2);

    let cells: Vec<_> = extraction
        .units
        .iter()
        .filter(|u| u.file == "Table/Item.rtbl")
        .collect();
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[0].key, TextKey::Cell(CellKey::new("Item", 0, "Name")));
    assert_eq!(cells[0].max_bytes, 12);
    assert_eq!(cells[0].slot_size, 16);

    assert_eq!(extraction.errors.len(), 1);
    assert_eq!(extraction.errors[0].file, "Message/Broken.msbt");
    assert!(extraction.errors[0].error.is_format());
}

#[test]
fn builds_a_same_layout_archive() {
    let original = archive();
    let payload = compress(&original, None, 3);
    let dictionaries = DictionarySet::new();
    let report = build_archive(
        &payload,
        ARCHIVE,
        &dictionaries,
        &names(),
        &translations(),
        &BuildOptions::default(),
    )
    .unwrap();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].file, "Message/Broken.msbt");
    assert!(report.skipped.is_empty());

    let records = report.files.iter().find(|f| f.kind == EntryKind::Records).unwrap();
    assert_eq!((records.written, records.rejected), (1, 1));
    let menu = report.files.iter().find(|f| f.kind == EntryKind::Messages).unwrap();
    assert_eq!((menu.written, menu.rejected), (3, 0));

    let rebuilt = decompress(&report.bytes, &dictionaries, ARCHIVE).unwrap();
    assert!(rebuilt.was_compressed);
    assert_eq!(rebuilt.bytes.len(), original.len());

    let sarc = Sarc::parse(&rebuilt.bytes).unwrap();
    let messages = msbt::parse(entry(&sarc, &rebuilt.bytes, "Message/Menu.msbt")).unwrap();
    assert_eq!(messages[0].text, "Jouer");
    assert_eq!(messages[1].text.matches(TAG_PLACEHOLDER).count(), 2);
    assert!(messages[1].text.contains("Tape"));
    assert_eq!(messages[2].text, "[b]Salut[/b]");

    let tables = rtbl::parse(entry(&sarc, &rebuilt.bytes, "Table/Item.rtbl"), &names()).unwrap();
    assert_eq!(tables[0].rows[0][0].as_text(), Some("Epee longue"));
    assert_eq!(tables[0].rows[1][0].as_text(), Some("Shield"));
    assert_eq!(tables[0].rows[1][1], Value::Int(80));

    assert_eq!(entry(&sarc, &rebuilt.bytes, "Misc/blob.bin"), &[0, 1, 2, 3]);
}

#[test]
fn untouched_archive_is_identical() {
    let original = archive();
    let report = build_archive(
        &original,
        "Mals/FRfr.Product.sarc",
        &DictionarySet::new(),
        &names(),
        &Translations::new(),
        &BuildOptions::default(),
    )
    .unwrap();
    assert_eq!(report.bytes, original);
    assert!(report.files.is_empty());
}
