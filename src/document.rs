/// One block-level element of a rendered agreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    // Level 0 is the document title; 1 and 2 are section headings.
    Heading { level: u8, text: String },
    // Embedded '\n' is rendered as a line break within the paragraph.
    Paragraph { text: String },
    Table(Table),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: bool,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn with_header(header: &[&str]) -> Self {
        Self {
            header: true,
            rows: vec![header.iter().map(|cell| cell.to_string()).collect()],
        }
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDocument {
    pub blocks: Vec<Block>,
}

impl RenderedDocument {
    pub fn heading(&mut self, level: u8, text: impl Into<String>) {
        self.blocks.push(Block::Heading {
            level,
            text: text.into(),
        });
    }

    pub fn paragraph(&mut self, text: impl Into<String>) {
        self.blocks.push(Block::Paragraph { text: text.into() });
    }

    pub fn table(&mut self, table: Table) {
        self.blocks.push(Block::Table(table));
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Table(table) => Some(table),
            _ => None,
        })
    }

    /// The first table placed directly after a heading with the given text.
    pub fn table_after_heading(&self, heading: &str) -> Option<&Table> {
        let start = self.heading_index(heading)?;
        self.blocks[start + 1..].iter().find_map(|block| match block {
            Block::Table(table) => Some(table),
            _ => None,
        })
    }

    /// Paragraph texts between the named heading and the next heading.
    pub fn paragraphs_under(&self, heading: &str) -> Vec<&str> {
        let Some(start) = self.heading_index(heading) else {
            return Vec::new();
        };
        self.blocks[start + 1..]
            .iter()
            .take_while(|block| !matches!(block, Block::Heading { .. }))
            .filter_map(|block| match block {
                Block::Paragraph { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn heading_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|block| matches!(block, Block::Heading { .. }))
            .count()
    }

    pub fn paragraph_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|block| matches!(block, Block::Paragraph { .. }))
            .count()
    }

    fn heading_index(&self, heading: &str) -> Option<usize> {
        self.blocks.iter().position(|block| match block {
            Block::Heading { text, .. } => text == heading,
            _ => false,
        })
    }
}
