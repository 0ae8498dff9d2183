//! Prompt templates. Placeholders are `{name}` and are filled with [`fill`].

pub const CLASSIFICATION_PROMPT: &str = r#"You classify input for a riddle service. Read the user's message and describe it.

Decide:
- inputType: one of question, url, procedural, numerical, comparative, descriptive, transactional
- isRiddle: true when the user is posing a riddle ("What am I", "I have ... but ...", "What has ...")
- needsSearch: true only for live information such as weather, news, prices or recent events
- riddleAnswer: the solution when isRiddle is true, otherwise null
- searchQuery: a short web query when needsSearch is true, otherwise null
- coreContent: the main subject a riddle should be written about
- userIntent: a few words on what the user wants
- badges: any of "riddle_asked", "search_needed"
- nextActionWord: a present-tense phrase describing the next step ("deciphering", "investigating")
- subsequentActionWord: when searching, a present-tense phrase for the step after the search

Reply with a single JSON object and nothing else:
{
  "inputType": "question",
  "isRiddle": false,
  "needsSearch": false,
  "riddleAnswer": null,
  "searchQuery": null,
  "coreContent": "main subject",
  "userIntent": "short intent",
  "badges": [],
  "nextActionWord": "analyzing",
  "subsequentActionWord": null
}

Input: {question}"#;

pub const RIDDLE_PROMPT: &str = r#"You write riddles. The answer to your riddle is:

ANSWER: {content}

How to build it:
1. Pick the most concrete, familiar form of the answer.
2. List what it looks like, sounds like, feels like and does.
3. Find one contradiction ("I have X but no Y").
4. Speak as the answer in the first person ("I am", "I have", "I can").
5. Steer the reader away from the obvious category without lying.
6. Check that a careful reader can reach the answer.

Shape:
"I have [trait] but cannot [expected ability].
I [action] but am not [obvious category].
What am I?"

Rules: two to four lines, plain words, no rhymes or limericks, no explanation.
Output only the riddle."#;

pub const SEARCH_ANSWER_PROMPT: &str = r#"Answer the question from these live search results. Prefer the results that address it directly. State facts in two or three sentences and never mention a knowledge cutoff.

Results:
{context}

Question: {question}

Answer:"#;

pub const KNOWLEDGE_ANSWER_PROMPT: &str = r#"Answer from general knowledge in two or three accurate sentences.

Topic: {topic}
Question: {question}

Answer:"#;

/// Replace every `{key}` in `template` with its value.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{key}}}"), value)
    })
}
