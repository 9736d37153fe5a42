//! Prompt text and response-shape descriptors for every AI call.

use serde_json::{Value, json};

use crate::models::{GeoLocation, Language, ProviderKind, SocialPlatform, TestSubmissionFormInputs};

pub const CHAT_SYSTEM_INSTRUCTION: &str = r#"You are a professional, helpful, and knowledgeable AI assistant for Hour-Tash Laboratory, a leading, knowledge-based laboratory for chemical and microbiological analysis. Your purpose is to assist users, who are primarily producers, farmers, exporters, and quality control managers, by providing accurate information about Hour-Tash's testing services.

**Your capabilities:**
*   Answer questions about tests for food, animal feed, and agricultural products, including feed additives, mycotoxin screening (Aflatoxin, Zearalenone), pesticide residue analysis, heavy metal analysis, microbiological counts and honey analysis.
*   Provide information on the laboratory, its certifications, and equipment (HPLC, GC, GC/MS, LC/MS/MS).
*   Help users find information on the website.

**App Features & Navigation:**
When a user's query matches one of the features below, recommend it with the given link format.
*   **AI Test Recommender**: [AI Test Recommender](page:test_recommender)
*   **Find Sample Drop-off**: [Find Sample Drop-off](page:sample_dropoff)
*   **Our Experts**: [Our Experts](page:our_experts)
*   **B2B Services**: [B2B Services](page:partnerships)
*   **Content Hub**: [Content Hub](page:content_hub)

**Tone and Style:**
*   Maintain a professional, scientific, and helpful tone at all times.

**Crucial Safety Instructions:**
*   DO NOT PROVIDE A DIAGNOSIS OR DECLARE A SAMPLE 'SAFE' OR 'UNSAFE'. Interpretation of results must be done by qualified experts.
*   Keep information general. Do not give country-specific regulatory advice; always defer to official standards and qualified consultants."#;

/// Site index used for semantic search when the caller does not supply one.
pub const DEFAULT_SITE_INDEX: &str = r#"
Service Categories:
- Food & Feed Analysis: chemical analysis of meat, honey, fats, grains and animal feed.
- Microbiology: pathogens, spoilage organisms, quality indicators, microbiological testing.
- Environmental: soil, water, minerals, ICP-MS, ICP-OES, Fire Assay.

Website Pages & Tools:
- Page: Home ('home'). Main page with service categories and company overview.
- Tool: AI Test Recommender ('test_recommender'). Describe a sample and suspected issues to get recommended tests such as aflatoxin screening, purity analysis or nutrient profiles.
- Page: Sample Drop-off Locations ('sample_dropoff'). Find partner locations where samples can be submitted.
- Tool: AI Consultant ('ai_consultant'). Chat with an AI expert about services, HPLC or GC/MS tests, and procedures.
- Page: Content Hub ('content_hub'). Food safety news, industry trends, and marketing content generation.
- Page: Our Experts ('our_experts'). The laboratory's specialists, their biographies and specialties.
- Page: B2B Services ('partnerships'). Contract testing, partnerships and business inquiries.
"#;

fn or_not_provided(value: &str) -> &str {
    if value.trim().is_empty() {
        "Not provided"
    } else {
        value
    }
}

pub fn recommendation_prompt(inputs: &TestSubmissionFormInputs, language: Language) -> String {
    format!(
        r#"Analyze the following sample submission for Hour-Tash Laboratory, a food, feed, and environmental testing facility.
Language for response: {language}.

Sample Details:
- Sample Type: {sample_type}
- Batch Size / Origin: {batch}
- Suspected Issue / Analysis Goal: {issue}
- Sample Age / Observation Period: {age}
- Specific Conditions (processing, storage): {conditions}
- Control Sample Info: {control}
- Previous Tests Performed: {previous}
- Current Additives/Treatments Applied: {additives}

Based on these details (and the provided image if any), act as an expert lab consultant. Generate a JSON response with a primary assessment, potential issues/analytes to test for (with relevance), recommended laboratory tests offered by Hour-Tash, and sample handling advice. You are an AI assistant, not a certified consultant.
Provide clear guidance on next steps, how to interpret these preliminary results, and when to consult a Hour-Tash expert in the 'nextStepsAndExpertConsultation' field.
Include a strong disclaimer that this is a preliminary recommendation and does not replace formal consultation."#,
        sample_type = inputs.sample_type,
        batch = or_not_provided(&inputs.batch_size_origin),
        issue = inputs.suspected_issue,
        age = or_not_provided(&inputs.sample_age),
        conditions = or_not_provided(&inputs.specific_conditions),
        control = or_not_provided(&inputs.control_sample_info),
        previous = or_not_provided(&inputs.previous_tests),
        additives = or_not_provided(&inputs.additives),
    )
}

pub fn test_details_prompt(test_names: &[String], language: Language) -> String {
    format!(
        r#"For the following Hour-Tash Laboratory tests: {names}.
Provide a detailed information plan in JSON format, one entry per test, echoing the test name in 'testName'.
It is CRITICAL that for each test you provide an explicit 'turnaroundTime' (e.g., '3-5 business days').
Also include the test's 'purpose', its 'methodology' (e.g., HPLC, GC/MS), and an 'estimatedCost' (if not available, state "Contact for quote").
The response language should be {language}."#,
        names = test_names.join(", "),
    )
}

pub fn providers_prompt(
    query: &str,
    location: Option<GeoLocation>,
    language: Language,
    kind: ProviderKind,
    max_results: usize,
    website_suffix: &str,
) -> String {
    let location_info = match location {
        Some(loc) => format!(
            "The user is near latitude {} and longitude {}.",
            loc.latitude, loc.longitude
        ),
        None => "The user has not provided their location; base the search on the query."
            .to_string(),
    };
    format!(
        r#"A user is looking for a {kind}.
Search Query: "{query}"
{location_info}

Generate a list of {max_results} hypothetical, plausible {kind}s based on the query.
For each, provide a name, full address, phone number, and a website.
Return the result as a JSON array of objects, where each object has "name", "address", "phone", and "website" keys.
The results should be appropriate for the language: {language}.

ABSOLUTELY CRITICAL FINAL INSTRUCTION for the "website" field:
1. The website URL MUST be fictional.
2. The website URL MUST NOT link to any real site or existing domain.
3. The website URL MUST end with the domain "{website_suffix}".

- CORRECT FORMAT: "www.some-provider-name{website_suffix}"
- INCORRECT FORMAT: "www.some-provider-name.com"

All website URLs must end in "{website_suffix}"."#
    )
}

pub fn semantic_search_prompt(
    query: &str,
    index: &str,
    language: Language,
    max_results: usize,
) -> String {
    format!(
        r#"You are a semantic search engine for the Hour-Tash Laboratory website. Analyze the user's query and the site index to provide the most relevant results.

User Query: "{query}"

Detailed Site Index:
---
{index}
---

Instructions:
1. Analyze Intent: understand whether the user wants a specific test, a tool, a person, or general information.
2. Semantic Matching: match meaning and concepts, not just keywords.
3. Rank and Score: identify up to {max_results} of the most relevant pages, each with a 'relevanceScore' from 0.0 (not relevant) to 1.0 (perfect match).
4. Generate Description: explain in 'description' why each result matches the query.
5. Format Output: return a JSON array adhering to the provided schema. The title and description should be in {language}."#
    )
}

pub fn trends_prompt(language: Language) -> String {
    format!(
        r#"Identify exactly three current and relevant trends in the food safety and agricultural testing industry.
For each trend, provide a short title and a one-sentence summary.
Return the response as a JSON array of objects, each with "title" and "summary" keys.
The response should be in {language}."#
    )
}

pub fn social_post_prompt(topic: &str, platform: SocialPlatform, language: Language) -> String {
    format!(
        r#"You are a social media manager for Hour-Tash Laboratory, an advanced analytical testing lab.
Generate content for a social media post on the platform: {platform}.
The topic is: "{topic}".
The post should be professional, engaging, and informative for producers, exporters, quality control managers, and farmers.
Return a JSON object with two keys:
1. "postText": The full text for the social media post.
2. "imagePrompt": A concise, descriptive prompt for an AI image generator to create a relevant, high-quality image for this post.

The response language should be {language}."#
    )
}

pub fn adapt_post_prompt(post_text: &str, platform: SocialPlatform, language: Language) -> String {
    format!(
        r#"Adapt the following social media post (from {platform}) into a short blog post or website article for Hour-Tash Laboratory.
Create a compelling "title" and expand the "content" to be more detailed, in well-structured markdown format.
Return a JSON object with "title" and "content" keys.
The response language should be {language}.

Original Post:
"{post_text}""#
    )
}

pub fn auto_fill_prompt(description: &str, language: Language) -> String {
    format!(
        r#"Based on the primary sample issue description below, infer likely answers for the optional detail fields.
Keep the answers very short and plausible. If you cannot infer a field, return an empty string for it.
Return a JSON object with keys: "specificConditions", "controlSampleInfo", "sampleAge".
The response language should be {language}.

Issue Description: "{description}""#
    )
}

// ───────────────────────────────────────────────────────────────────────────────
// Response schemas (Gemini OpenAPI subset)
// ───────────────────────────────────────────────────────────────────────────────

pub fn recommendation_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "primaryAssessment": { "type": "STRING", "description": "A concise primary assessment of the situation." },
            "assessmentDescription": { "type": "STRING", "description": "A one-paragraph summary of the assessment." },
            "potentialIssues": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "description": { "type": "STRING" },
                        "relevance": { "type": "STRING", "enum": ["High", "Medium", "Low"] }
                    },
                    "required": ["name", "description", "relevance"]
                }
            },
            "recommendedTests": { "type": "ARRAY", "items": { "type": "STRING" } },
            "managementAdvice": { "type": "ARRAY", "items": { "type": "STRING" } },
            "nextStepsAndExpertConsultation": { "type": "STRING" },
            "disclaimer": { "type": "STRING" }
        },
        "required": [
            "primaryAssessment", "assessmentDescription", "potentialIssues",
            "recommendedTests", "managementAdvice", "nextStepsAndExpertConsultation", "disclaimer"
        ]
    })
}

pub fn test_details_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "testName": { "type": "STRING" },
                "purpose": { "type": "STRING" },
                "methodology": { "type": "STRING" },
                "turnaroundTime": { "type": "STRING" },
                "estimatedCost": { "type": "STRING" }
            },
            "required": ["testName", "purpose", "methodology", "turnaroundTime", "estimatedCost"]
        }
    })
}

pub fn search_results_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "title": { "type": "STRING" },
                "description": { "type": "STRING" },
                "targetPage": {
                    "type": "STRING",
                    "enum": ["home", "test_recommender", "sample_dropoff", "ai_consultant", "content_hub", "our_experts", "partnerships"]
                },
                "relevanceScore": { "type": "NUMBER" }
            },
            "required": ["title", "description", "targetPage", "relevanceScore"]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_prompt_fills_missing_fields() {
        let inputs = TestSubmissionFormInputs {
            sample_type: "Pistachio".to_string(),
            suspected_issue: "Aflatoxin".to_string(),
            ..Default::default()
        };
        let prompt = recommendation_prompt(&inputs, Language::Fa);
        assert!(prompt.contains("Sample Type: Pistachio"));
        assert!(prompt.contains("Batch Size / Origin: Not provided"));
        assert!(prompt.contains("Language for response: fa"));
    }

    #[test]
    fn test_providers_prompt_embeds_suffix_and_location() {
        let prompt = providers_prompt(
            "honey lab",
            Some(GeoLocation {
                latitude: 35.5,
                longitude: 51.25,
            }),
            Language::En,
            ProviderKind::Veterinarian,
            5,
            ".example.com",
        );
        assert!(prompt.contains("latitude 35.5 and longitude 51.25"));
        assert!(prompt.contains("must end in \".example.com\"") || prompt.contains("end with the domain \".example.com\""));
        assert!(prompt.contains("5 hypothetical, plausible veterinarians"));
    }

    #[test]
    fn test_search_schema_lists_every_page() {
        let schema = search_results_schema();
        let pages = schema["items"]["properties"]["targetPage"]["enum"]
            .as_array()
            .expect("enum should be an array");
        assert_eq!(pages.len(), 7);
    }
}
