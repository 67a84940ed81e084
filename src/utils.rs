use anyhow::{Result, anyhow};
use image::{Rgb, RgbImage};
use lopdf::{
    Document, Object, ObjectId, Stream,
    content::{Content, Operation},
    dictionary,
};
use rand::Rng;
use std::path::Path;

#[cfg(test)]
const TEST_DIR: &str = "dev-playground/test";

/// Get a PDF file with minimal features: `num_pages` A4 pages, each showing the
/// document name, the page number and some random text.
pub fn get_basic_pdf_doc(doc_name: &str, num_pages: u8) -> Result<Document> {
    if doc_name.contains('/') {
        return Err(anyhow!(
            "The document name provided contains a '/', not allowed!"
        ));
    }

    let mut doc = Document::with_version("1.7");
    let pages_root_id = crate::initialise_doc_with_null_pages(&mut doc)?;

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    for page_number in 1..=num_pages {
        let lines = [
            (46, doc_name.to_string()),
            (36, format!("Page {page_number} of {num_pages}")),
            (20, craft_random_text_of_len(20)),
        ];
        let page_id = add_text_page(&mut doc, pages_root_id, resources_id, &lines)?;
        crate::append_kid(&mut doc, pages_root_id, page_id, 1)?;
    }

    Ok(doc)
}

/// An A4 page drawing each line with its font size, top to bottom.
fn add_text_page(
    doc: &mut Document,
    pages_root_id: ObjectId,
    resources_id: ObjectId,
    lines: &[(i64, String)],
) -> Result<ObjectId> {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Td", vec![50.into(), 600.into()]),
        Operation::new("TL", vec![50.into()]),
    ];
    for (index, (font_size, text)) in lines.iter().enumerate() {
        let show_operator = if index == 0 { "Tj" } else { "'" };
        operations.push(Operation::new("Tf", vec!["F1".into(), (*font_size).into()]));
        operations.push(Operation::new(
            show_operator,
            vec![Object::string_literal(text.as_str())],
        ));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_root_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    }))
}

/// Write a basic PDF named after the file name of `pdf_path`.
pub fn write_basic_pdf(pdf_path: impl AsRef<Path>, num_pages: u8) -> Result<()> {
    let pdf_path = pdf_path.as_ref();

    let doc_name = pdf_path
        .file_name()
        .ok_or(anyhow!(
            "The path '{}' does not present a filename",
            pdf_path.display()
        ))?
        .to_string_lossy()
        .to_string();

    let mut pdf_doc = get_basic_pdf_doc(&doc_name, num_pages)?;
    pdf_doc.save(pdf_path)?;

    Ok(())
}

/// Write an image of random pixels; the format follows the extension of `image_path`.
pub fn write_noise_image(image_path: impl AsRef<Path>, width: u32, height: u32) -> Result<()> {
    let image_path = image_path.as_ref();
    if width == 0 || height == 0 {
        return Err(anyhow!("An image needs at least one pixel, got {width}x{height}"));
    }

    let mut rng = rand::rng();
    let image = RgbImage::from_fn(width, height, |_x, _y| Rgb(rng.random::<[u8; 3]>()));
    image
        .save(image_path)
        .map_err(|err| anyhow!("Could not write the image '{}': {err}", image_path.display()))?;

    Ok(())
}

pub fn craft_random_text_of_len(char_length: usize) -> String {
    use rand::distr::{Alphanumeric, SampleString};
    Alphanumeric.sample_string(&mut rand::rng(), char_length)
}

/// A fresh, empty directory for the test `dir_name`, relative to the crate root.
#[cfg(test)]
pub(crate) fn get_virgin_test_dir(dir_name: impl AsRef<Path>) -> Result<String> {
    let dir_path = format!("{TEST_DIR}/{}", dir_name.as_ref().display());

    if std::fs::exists(&dir_path)? {
        std::fs::remove_dir_all(&dir_path)?;
    }

    std::fs::create_dir_all(&dir_path)?;
    Ok(dir_path)
}
