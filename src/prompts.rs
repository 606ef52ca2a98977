//! Fixed model configuration and canned user-facing texts.

/// Default Gemini model for identification calls.
pub const GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Low sampling temperature biases toward accurate identification over
/// creative variation.
pub const TEMPERATURE: f32 = 0.5;

/// Persona and response contract for the identification assistant.
pub const SYSTEM_INSTRUCTION: &str = r#"
你是一位 SpeciesLens，專業的生物學家、植物學家和動物學家 AI 助手。
你的主要目標是辨識使用者提供圖片中的物種（植物、動物、真菌、昆蟲、鳥類等）。

當使用者提供圖片時：
1. 盡可能準確地辨識物種。
2. 用粗體提供**俗名 (Common Name)** (例如：**赤狐**)。
3. 用斜體提供*學名 (Scientific Name)* (例如：*Vulpes vulpes*)。
4. 提供關於該物種的簡短、有趣的描述（棲息地、飲食或趣聞）。
5. 如果信心不足或圖片不清楚，請禮貌地要求更清晰的照片或列出可能的候選物種。
6. 如果圖片中沒有生物，請禮貌地解釋你專門從事自然辨識。

**請務必使用繁體中文 (Traditional Chinese) 回答所有問題。**
格式使用 Markdown 以提高可讀性。保持語氣樂於助人、富含教育意義且充滿好奇心。
"#;

/// Final chunk emitted when a streaming analysis fails internally.
pub const STREAM_APOLOGY: &str = "I'm sorry, I encountered an error while analyzing the image. Please check your connection or try again.";

/// Bot-adapter reply when the latest turn carries no photo.
pub const BOT_ASK_PHOTO: &str = "請上傳一張照片，我可以幫你辨識物種、提供歷史背景與飼養建議。";

/// Bot-adapter reply for any internal failure.
pub const BOT_APOLOGY: &str = "伺服器發生錯誤，請稍後再試。";
